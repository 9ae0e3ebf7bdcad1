pub mod run_history;

pub use run_history::PostgresRunHistoryRepository;
