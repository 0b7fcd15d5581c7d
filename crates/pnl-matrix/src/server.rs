//! HTTP surface over [`PnlService`]

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pnl_model::{Dimension, PnlNode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::details::CellDetail;
use crate::error::PnlError;
use crate::ledger::Ledger;
use crate::request::{BreakdownParams, DetailParams, TreeParams};
use crate::service::PnlService;
use crate::warehouse::Warehouse;

impl IntoResponse for PnlError {
    fn into_response(self) -> Response {
        let body = self.to_body();
        let status = StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

type Shared<W, L> = State<Arc<PnlService<W, L>>>;

async fn tree_handler<W, L>(
    State(service): Shared<W, L>,
    Query(params): Query<TreeParams>,
) -> Result<Json<Vec<PnlNode>>, PnlError>
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    let year = params.year()?;
    Ok(Json(service.build_year_tree(year).await?))
}

async fn breakdown_handler<W, L>(
    State(service): Shared<W, L>,
    Path(dimension): Path<String>,
    Query(params): Query<BreakdownParams>,
) -> Result<Json<Vec<PnlNode>>, PnlError>
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    let (year, line, dimension) = params.parse(&dimension)?;
    let nodes = match dimension {
        Dimension::Family => service.family_breakdown(year, line).await?,
        Dimension::Product => service.product_breakdown(year, line).await?,
        Dimension::VolumeFamily => service.volume_family_breakdown(year, line).await?,
        Dimension::VolumeProduct => service.volume_product_breakdown(year, line).await?,
    };
    Ok(Json(nodes))
}

async fn detail_handler<W, L>(
    State(service): Shared<W, L>,
    Query(params): Query<DetailParams>,
) -> Result<Json<CellDetail>, PnlError>
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    let (month, target) = params.parse()?;
    Ok(Json(service.cell_detail(month, &target).await?))
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router<W, L>(service: Arc<PnlService<W, L>>) -> Router
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    Router::new()
        .route("/api/pnl", get(tree_handler::<W, L>))
        .route("/api/breakdown/{dimension}", get(breakdown_handler::<W, L>))
        .route("/api/detail", get(detail_handler::<W, L>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve until the process is stopped
pub async fn serve<W, L>(service: PnlService<W, L>, bind: SocketAddr) -> Result<()>
where
    W: Warehouse + 'static,
    L: Ledger + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!(%bind, "serving P&L matrix");
    axum::serve(listener, router(Arc::new(service)))
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
