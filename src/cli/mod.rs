pub mod rate;
pub mod rates;
pub mod refresh;
pub mod setup;
pub mod ui;
