//! Derived statistics: table definitions, incremental updates, seeding

pub mod audit;
pub mod delta;
pub mod seeder;
pub mod summary;
pub mod table;
pub mod updater;

pub use audit::{verify_consistency, Discrepancy};
pub use seeder::{SeedReport, Seeder};
pub use summary::{Summary, SummaryField};
pub use table::{
    AggregateKey, AggregateRow, AggregateTable, AggregateValue, CustomersByCountry,
    OrdersByCountry, ProductsByCategory, PurchasesByCustomer, SalesByCategory, SalesByCountry,
    SalesByEmployee, StatisticRow,
};
pub use updater::AggregateUpdater;
