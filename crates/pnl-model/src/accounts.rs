//! Account-line identifiers shared by the tree builder and every consumer
//!
//! Fixed P&L lines, the sales lines that can be broken down or drilled into,
//! tax names and scenarios, and the designated expense groups. Ids returned
//! by these types are stable across builds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::node::{NodeKind, Sign};

// =============================================================================
// Fixed Account Lines
// =============================================================================

/// Every fixed line of the statement. Expense groups and breakdown rows are
/// data-driven and do not appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountLine {
    GrossRevenue,
    GrossRevenueVolumes,
    Returns,
    ReturnsVolumes,
    RevenueTaxes,
    TaxIpi,
    StTaxes,
    Discount,
    NetRevenue,
    NetRevenueMargin,
    Cogs,
    CogsBonus,
    CogsLoss,
    CogsReturn,
    OperatingIncome,
    OperatingIncomeMargin,
    GrossProfit,
    GrossProfitMargin,
    Ebitda,
    EbitdaMargin,
    FinancialRevenue,
    IncomeTaxes,
    CsllConsidered,
    CsllPosted,
    CsllProvisioned,
    IrpjConsidered,
    IrpjPosted,
    IrpjProvisioned,
    NetProfit,
    NetProfitMargin,
}

impl AccountLine {
    pub const ALL: [AccountLine; 30] = [
        AccountLine::GrossRevenue,
        AccountLine::GrossRevenueVolumes,
        AccountLine::Returns,
        AccountLine::ReturnsVolumes,
        AccountLine::RevenueTaxes,
        AccountLine::TaxIpi,
        AccountLine::StTaxes,
        AccountLine::Discount,
        AccountLine::NetRevenue,
        AccountLine::NetRevenueMargin,
        AccountLine::Cogs,
        AccountLine::CogsBonus,
        AccountLine::CogsLoss,
        AccountLine::CogsReturn,
        AccountLine::OperatingIncome,
        AccountLine::OperatingIncomeMargin,
        AccountLine::GrossProfit,
        AccountLine::GrossProfitMargin,
        AccountLine::Ebitda,
        AccountLine::EbitdaMargin,
        AccountLine::FinancialRevenue,
        AccountLine::IncomeTaxes,
        AccountLine::CsllConsidered,
        AccountLine::CsllPosted,
        AccountLine::CsllProvisioned,
        AccountLine::IrpjConsidered,
        AccountLine::IrpjPosted,
        AccountLine::IrpjProvisioned,
        AccountLine::NetProfit,
        AccountLine::NetProfitMargin,
    ];

    pub fn id(self) -> &'static str {
        match self {
            AccountLine::GrossRevenue => "gross_revenue",
            AccountLine::GrossRevenueVolumes => "gross_revenue_volumes",
            AccountLine::Returns => "returns",
            AccountLine::ReturnsVolumes => "returns_volumes",
            AccountLine::RevenueTaxes => "revenue_taxes",
            AccountLine::TaxIpi => "tax_ipi",
            AccountLine::StTaxes => "st_taxes",
            AccountLine::Discount => "discount",
            AccountLine::NetRevenue => "net_revenue",
            AccountLine::NetRevenueMargin => "net_revenue_margin",
            AccountLine::Cogs => "cogs",
            AccountLine::CogsBonus => "cogs_bonus",
            AccountLine::CogsLoss => "cogs_loss",
            AccountLine::CogsReturn => "cogs_return",
            AccountLine::OperatingIncome => "operating_income",
            AccountLine::OperatingIncomeMargin => "operating_income_margin",
            AccountLine::GrossProfit => "gross_profit",
            AccountLine::GrossProfitMargin => "gross_profit_margin",
            AccountLine::Ebitda => "ebitda",
            AccountLine::EbitdaMargin => "ebitda_margin",
            AccountLine::FinancialRevenue => "financial_revenue",
            AccountLine::IncomeTaxes => "income_taxes",
            AccountLine::CsllConsidered => "csll_considered",
            AccountLine::CsllPosted => "csll_posted",
            AccountLine::CsllProvisioned => "csll_provisioned",
            AccountLine::IrpjConsidered => "irpj_considered",
            AccountLine::IrpjPosted => "irpj_posted",
            AccountLine::IrpjProvisioned => "irpj_provisioned",
            AccountLine::NetProfit => "net_profit",
            AccountLine::NetProfitMargin => "net_profit_margin",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AccountLine::GrossRevenue => "Gross revenue",
            AccountLine::GrossRevenueVolumes => "Volumes (revenue)",
            AccountLine::Returns => "Returns",
            AccountLine::ReturnsVolumes => "Volumes (returns)",
            AccountLine::RevenueTaxes => "Taxes on revenue",
            AccountLine::TaxIpi => "IPI",
            AccountLine::StTaxes => "ST taxes",
            AccountLine::Discount => "Financial discounts",
            AccountLine::NetRevenue => "Net revenue",
            AccountLine::NetRevenueMargin => "Margin %",
            AccountLine::Cogs => "COGS",
            AccountLine::CogsBonus => "COGS bonuses and samples",
            AccountLine::CogsLoss => "Losses and write-offs",
            AccountLine::CogsReturn => "COGS returns",
            AccountLine::OperatingIncome => "Operating income",
            AccountLine::OperatingIncomeMargin => "Operating income %",
            AccountLine::GrossProfit => "Gross profit",
            AccountLine::GrossProfitMargin => "Gross profit %",
            AccountLine::Ebitda => "EBITDA",
            AccountLine::EbitdaMargin => "EBITDA %",
            AccountLine::FinancialRevenue => "Financial revenue",
            AccountLine::IncomeTaxes => "Income taxes",
            AccountLine::CsllConsidered => "CSLL (considered)",
            AccountLine::CsllPosted => "CSLL (posted)",
            AccountLine::CsllProvisioned => "CSLL (provisioned)",
            AccountLine::IrpjConsidered => "IRPJ (considered)",
            AccountLine::IrpjPosted => "IRPJ (posted)",
            AccountLine::IrpjProvisioned => "IRPJ (provisioned)",
            AccountLine::NetProfit => "Net profit",
            AccountLine::NetProfitMargin => "Net profit %",
        }
    }

    pub fn sign(self) -> Sign {
        match self {
            AccountLine::Returns
            | AccountLine::RevenueTaxes
            | AccountLine::TaxIpi
            | AccountLine::StTaxes
            | AccountLine::Discount
            | AccountLine::CogsReturn
            | AccountLine::IncomeTaxes
            | AccountLine::CsllConsidered
            | AccountLine::CsllPosted
            | AccountLine::CsllProvisioned
            | AccountLine::IrpjConsidered
            | AccountLine::IrpjPosted
            | AccountLine::IrpjProvisioned => Sign::Minus,
            _ => Sign::Plus,
        }
    }

    pub fn kind(self) -> NodeKind {
        match self {
            AccountLine::GrossRevenueVolumes | AccountLine::ReturnsVolumes => NodeKind::VolumeParent,
            AccountLine::NetRevenue
            | AccountLine::OperatingIncome
            | AccountLine::GrossProfit
            | AccountLine::Ebitda
            | AccountLine::NetProfit => NodeKind::Intermediate,
            AccountLine::NetRevenueMargin
            | AccountLine::OperatingIncomeMargin
            | AccountLine::GrossProfitMargin
            | AccountLine::EbitdaMargin
            | AccountLine::NetProfitMargin => NodeKind::Percentage,
            AccountLine::FinancialRevenue => NodeKind::Group,
            _ => NodeKind::Plain,
        }
    }

    /// The sales line whose underlying invoices back this line, if any.
    /// Volume parents resolve to the line they count units for.
    pub fn sales_line(self) -> Option<SalesLine> {
        match self {
            AccountLine::GrossRevenue | AccountLine::GrossRevenueVolumes => Some(SalesLine::GrossRevenue),
            AccountLine::Returns | AccountLine::ReturnsVolumes => Some(SalesLine::Returns),
            AccountLine::Discount => Some(SalesLine::Discount),
            AccountLine::Cogs => Some(SalesLine::Cogs),
            AccountLine::CogsBonus => Some(SalesLine::CogsBonus),
            AccountLine::CogsLoss => Some(SalesLine::CogsLoss),
            AccountLine::CogsReturn => Some(SalesLine::CogsReturn),
            _ => None,
        }
    }
}

impl fmt::Display for AccountLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for AccountLine {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim();
        AccountLine::ALL
            .into_iter()
            .find(|line| line.id() == id)
            .ok_or_else(|| ModelError::unknown("account line", s))
    }
}

// =============================================================================
// Sales Lines
// =============================================================================

/// Lines backed by invoice items in the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesLine {
    GrossRevenue,
    Returns,
    Discount,
    Cogs,
    CogsBonus,
    CogsLoss,
    CogsReturn,
}

impl SalesLine {
    pub const ALL: [SalesLine; 7] = [
        SalesLine::GrossRevenue,
        SalesLine::Returns,
        SalesLine::Discount,
        SalesLine::Cogs,
        SalesLine::CogsBonus,
        SalesLine::CogsLoss,
        SalesLine::CogsReturn,
    ];

    pub fn account(self) -> AccountLine {
        match self {
            SalesLine::GrossRevenue => AccountLine::GrossRevenue,
            SalesLine::Returns => AccountLine::Returns,
            SalesLine::Discount => AccountLine::Discount,
            SalesLine::Cogs => AccountLine::Cogs,
            SalesLine::CogsBonus => AccountLine::CogsBonus,
            SalesLine::CogsLoss => AccountLine::CogsLoss,
            SalesLine::CogsReturn => AccountLine::CogsReturn,
        }
    }

    pub fn id(self) -> &'static str {
        self.account().id()
    }

    /// Unit volumes are only tracked for sold and returned goods
    pub fn volume_parent(self) -> Option<AccountLine> {
        match self {
            SalesLine::GrossRevenue => Some(AccountLine::GrossRevenueVolumes),
            SalesLine::Returns => Some(AccountLine::ReturnsVolumes),
            _ => None,
        }
    }
}

impl fmt::Display for SalesLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for SalesLine {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SalesLine::ALL
            .into_iter()
            .find(|line| line.id() == s.trim())
            .ok_or_else(|| ModelError::unknown("sales line", s))
    }
}

// =============================================================================
// Breakdowns
// =============================================================================

/// Auxiliary dimension a sales line can be re-aggregated by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Family,
    Product,
    VolumeFamily,
    VolumeProduct,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Family,
        Dimension::Product,
        Dimension::VolumeFamily,
        Dimension::VolumeProduct,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Dimension::Family => "family",
            Dimension::Product => "product",
            Dimension::VolumeFamily => "volume_family",
            Dimension::VolumeProduct => "volume_product",
        }
    }

    /// Label of the placeholder row that expands into this breakdown
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Family | Dimension::VolumeFamily => "Family",
            Dimension::Product | Dimension::VolumeProduct => "Product",
        }
    }

    pub fn is_volume(self) -> bool {
        matches!(self, Dimension::VolumeFamily | Dimension::VolumeProduct)
    }

    pub fn is_product(self) -> bool {
        matches!(self, Dimension::Product | Dimension::VolumeProduct)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Dimension {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|dimension| dimension.id() == s.trim())
            .ok_or_else(|| ModelError::unknown("dimension", s))
    }
}

/// A validated (sales line, dimension) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BreakdownParts")]
pub struct BreakdownRequest {
    line: SalesLine,
    dimension: Dimension,
}

#[derive(Deserialize)]
struct BreakdownParts {
    line: SalesLine,
    dimension: Dimension,
}

impl TryFrom<BreakdownParts> for BreakdownRequest {
    type Error = ModelError;

    fn try_from(parts: BreakdownParts) -> Result<Self, Self::Error> {
        BreakdownRequest::new(parts.line, parts.dimension)
    }
}

impl BreakdownRequest {
    pub fn new(line: SalesLine, dimension: Dimension) -> Result<Self, ModelError> {
        if dimension.is_volume() && line.volume_parent().is_none() {
            return Err(ModelError::UnsupportedBreakdown { line, dimension });
        }
        Ok(Self { line, dimension })
    }

    pub fn line(self) -> SalesLine {
        self.line
    }

    pub fn dimension(self) -> Dimension {
        self.dimension
    }

    /// Id of the tree node this breakdown expands: the sales line, or its
    /// volume parent for quantity breakdowns
    pub fn owner_id(self) -> &'static str {
        match self.dimension {
            Dimension::VolumeFamily | Dimension::VolumeProduct => self
                .line
                .volume_parent()
                .map(AccountLine::id)
                .unwrap_or_else(|| self.line.id()),
            Dimension::Family | Dimension::Product => self.line.id(),
        }
    }

    /// `"family"` or `"product"`
    pub fn axis(self) -> &'static str {
        if self.dimension.is_product() { "product" } else { "family" }
    }

    /// Id of the node the breakdown rows hang under
    pub fn placeholder_id(self) -> String {
        format!("{}.breakdown.{}", self.owner_id(), self.axis())
    }
}

// =============================================================================
// Taxes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaxName {
    #[serde(rename = "PIS")]
    Pis,
    #[serde(rename = "Cofins")]
    Cofins,
    #[serde(rename = "ISS")]
    Iss,
    #[serde(rename = "IR")]
    Ir,
    #[serde(rename = "FCP")]
    Fcp,
    #[serde(rename = "ICMS")]
    Icms,
    #[serde(rename = "IPI")]
    Ipi,
    #[serde(rename = "ICMS_ST")]
    IcmsSt,
    #[serde(rename = "FCP_ST")]
    FcpSt,
}

impl TaxName {
    pub const ALL: [TaxName; 9] = [
        TaxName::Pis,
        TaxName::Cofins,
        TaxName::Iss,
        TaxName::Ir,
        TaxName::Fcp,
        TaxName::Icms,
        TaxName::Ipi,
        TaxName::IcmsSt,
        TaxName::FcpSt,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TaxName::Pis => "PIS",
            TaxName::Cofins => "Cofins",
            TaxName::Iss => "ISS",
            TaxName::Ir => "IR",
            TaxName::Fcp => "FCP",
            TaxName::Icms => "ICMS",
            TaxName::Ipi => "IPI",
            TaxName::IcmsSt => "ICMS_ST",
            TaxName::FcpSt => "FCP_ST",
        }
    }

    pub fn family(self) -> TaxFamily {
        match self {
            TaxName::IcmsSt | TaxName::FcpSt => TaxFamily::St,
            _ => TaxFamily::Revenue,
        }
    }
}

impl fmt::Display for TaxName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for TaxName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaxName::ALL
            .into_iter()
            .find(|tax| tax.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::unknown("tax", s))
    }
}

/// Invoice scenario a tax amount was levied under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxScenario {
    Sale,
    Bonus,
    Return,
}

impl TaxScenario {
    pub const ALL: [TaxScenario; 3] = [TaxScenario::Sale, TaxScenario::Bonus, TaxScenario::Return];

    pub fn id(self) -> &'static str {
        match self {
            TaxScenario::Sale => "sale",
            TaxScenario::Bonus => "bonus",
            TaxScenario::Return => "return",
        }
    }

    /// Return amounts are stored sign-flipped
    pub fn factor(self) -> f64 {
        match self {
            TaxScenario::Return => -1.0,
            TaxScenario::Sale | TaxScenario::Bonus => 1.0,
        }
    }

    pub fn node_sign(self) -> Sign {
        match self {
            TaxScenario::Return => Sign::Minus,
            TaxScenario::Sale | TaxScenario::Bonus => Sign::Plus,
        }
    }
}

impl fmt::Display for TaxScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for TaxScenario {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaxScenario::ALL
            .into_iter()
            .find(|scenario| scenario.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::unknown("tax scenario", s))
    }
}

/// The two tax subtrees of the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxFamily {
    Revenue,
    St,
}

impl TaxFamily {
    pub fn root(self) -> AccountLine {
        match self {
            TaxFamily::Revenue => AccountLine::RevenueTaxes,
            TaxFamily::St => AccountLine::StTaxes,
        }
    }

    pub fn taxes(self) -> &'static [TaxName] {
        match self {
            TaxFamily::Revenue => &[
                TaxName::Pis,
                TaxName::Cofins,
                TaxName::Iss,
                TaxName::Ir,
                TaxName::Fcp,
                TaxName::Icms,
                TaxName::Ipi,
            ],
            TaxFamily::St => &[TaxName::IcmsSt, TaxName::FcpSt],
        }
    }
}

// =============================================================================
// Expense Groups
// =============================================================================

/// Ledger expense groups the statement formulas refer to, matched by the
/// group code that prefixes the ledger's group label (`"2.07 + Operacionais"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseGroup {
    Import,
    Tax,
    Personnel,
    GeneralAdministrative,
    Marketing,
    Financial,
    Operating,
    TradeMarketing,
    Services,
    Disregarded,
}

impl ExpenseGroup {
    pub const ALL: [ExpenseGroup; 10] = [
        ExpenseGroup::Import,
        ExpenseGroup::Tax,
        ExpenseGroup::Personnel,
        ExpenseGroup::GeneralAdministrative,
        ExpenseGroup::Marketing,
        ExpenseGroup::Financial,
        ExpenseGroup::Operating,
        ExpenseGroup::TradeMarketing,
        ExpenseGroup::Services,
        ExpenseGroup::Disregarded,
    ];

    /// Groups deducted from operating income to reach EBITDA
    pub const COST_CENTERS: [ExpenseGroup; 7] = [
        ExpenseGroup::Import,
        ExpenseGroup::Personnel,
        ExpenseGroup::GeneralAdministrative,
        ExpenseGroup::Marketing,
        ExpenseGroup::Operating,
        ExpenseGroup::TradeMarketing,
        ExpenseGroup::Services,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ExpenseGroup::Import => "2.01",
            ExpenseGroup::Tax => "2.02",
            ExpenseGroup::Personnel => "2.03",
            ExpenseGroup::GeneralAdministrative => "2.04",
            ExpenseGroup::Marketing => "2.05",
            ExpenseGroup::Financial => "2.06",
            ExpenseGroup::Operating => "2.07",
            ExpenseGroup::TradeMarketing => "2.08",
            ExpenseGroup::Services => "2.09",
            ExpenseGroup::Disregarded => "2.10",
        }
    }

    /// Designated groups placed with a percent-of-gross-revenue sibling row
    pub fn has_percent_row(self) -> bool {
        !matches!(self, ExpenseGroup::Tax | ExpenseGroup::Disregarded)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let code = label.split('+').next()?.trim();
        ExpenseGroup::ALL.into_iter().find(|group| group.code() == code)
    }
}

/// Id of the node for a ledger expense group
pub fn expense_group_id(group_label: &str) -> String {
    format!("expense.{}", group_label)
}

/// Id of the node for one category inside a ledger expense group
pub fn expense_category_id(group_label: &str, category: &str) -> String {
    format!("expense.{}.{}", group_label, category)
}

// =============================================================================
// Drill-down Targets
// =============================================================================

/// What a single (row, month) cell itemizes into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellTarget {
    Line { line: SalesLine },
    Tax { tax: TaxName, scenario: TaxScenario },
    Expense { group: String, category: String },
    FinancialRevenue { parent: String, category: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_ids_round_trip_and_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for line in AccountLine::ALL {
            assert!(seen.insert(line.id()), "duplicate id {}", line.id());
            assert_eq!(line.id().parse::<AccountLine>().unwrap(), line);
        }
        assert!("7".parse::<AccountLine>().is_err());
    }

    #[test]
    fn test_serde_ids_match_display_ids() {
        for line in AccountLine::ALL {
            let json = serde_json::to_value(line).unwrap();
            assert_eq!(json, line.id());
        }
        for line in SalesLine::ALL {
            let json = serde_json::to_value(line).unwrap();
            assert_eq!(json, line.id());
        }
    }

    #[test]
    fn test_volume_breakdown_only_for_revenue_and_returns() {
        assert!(BreakdownRequest::new(SalesLine::GrossRevenue, Dimension::VolumeFamily).is_ok());
        assert!(BreakdownRequest::new(SalesLine::Returns, Dimension::VolumeProduct).is_ok());
        assert_eq!(
            BreakdownRequest::new(SalesLine::Cogs, Dimension::VolumeFamily),
            Err(ModelError::UnsupportedBreakdown {
                line: SalesLine::Cogs,
                dimension: Dimension::VolumeFamily
            })
        );
        assert!(BreakdownRequest::new(SalesLine::CogsLoss, Dimension::Product).is_ok());

        let json = serde_json::json!({ "line": "discount", "dimension": "volume_product" });
        assert!(serde_json::from_value::<BreakdownRequest>(json).is_err());
    }

    #[test]
    fn test_placeholder_ids() {
        let cogs = BreakdownRequest::new(SalesLine::Cogs, Dimension::Family).unwrap();
        assert_eq!(cogs.placeholder_id(), "cogs.breakdown.family");

        let volumes = BreakdownRequest::new(SalesLine::Returns, Dimension::VolumeProduct).unwrap();
        assert_eq!(volumes.placeholder_id(), "returns_volumes.breakdown.product");
    }

    #[test]
    fn test_tax_parsing_is_case_insensitive() {
        assert_eq!("cofins".parse::<TaxName>().unwrap(), TaxName::Cofins);
        assert_eq!("ICMS_ST".parse::<TaxName>().unwrap(), TaxName::IcmsSt);
        assert!("VAT".parse::<TaxName>().is_err());
        assert_eq!("Return".parse::<TaxScenario>().unwrap(), TaxScenario::Return);
        assert_eq!(TaxName::FcpSt.family(), TaxFamily::St);
    }

    #[test]
    fn test_expense_group_from_label() {
        assert_eq!(ExpenseGroup::from_label("2.07 + Operacionais"), Some(ExpenseGroup::Operating));
        assert_eq!(ExpenseGroup::from_label("2.10 + Desconsiderados"), Some(ExpenseGroup::Disregarded));
        assert_eq!(ExpenseGroup::from_label("2.11 + Outros"), None);
        assert_eq!(ExpenseGroup::from_label(""), None);
    }

    #[test]
    fn test_cell_target_serializes_tagged() {
        let target = CellTarget::Tax {
            tax: TaxName::Icms,
            scenario: TaxScenario::Return,
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["kind"], "tax");
        assert_eq!(json["tax"], "ICMS");
        assert_eq!(json["scenario"], "return");
    }
}
