pub mod error;
pub mod invoice;
pub mod money;
pub mod report;
pub mod rule;

pub use error::{Severity, ValidationError};
pub use invoice::{IcmsFields, Invoice, Item, OperationNature, Party, TaxFields, Totals};
pub use report::{
    AuditSummary, BatchOutcome, BatchSummary, InvoiceReport, InvoiceStatus, ReportTree,
    SeverityCounts,
};
pub use rule::{
    CfopRule, CstRule, NcmRule, OperationScope, OverrideKind, RuleLookup, RuleRecord,
    SituationKind, StateOverride,
};
