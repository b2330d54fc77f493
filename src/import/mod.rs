//! Importers for daily inputs and feel-score history

pub mod csv;

pub use self::csv::{import_daily_inputs, import_feel_history, DailyCsvImporter, DailyInputRow};
