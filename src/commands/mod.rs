pub mod dedup;
pub mod enqueue;
pub mod run;

pub use dedup::run_dedup;
pub use enqueue::run_enqueue;
pub use run::run_worker;
