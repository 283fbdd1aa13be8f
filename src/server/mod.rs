//! Server-wide state: admission gate, counters and execution contexts.

pub mod counters;
pub mod execution;
pub mod gate;
pub mod instance;

pub use counters::{CounterSnapshot, StatementCounters};
pub use execution::{Execution, Interrupt, Purpose, StatementLocus};
pub use gate::{GatePermit, QueryGate};
pub use instance::{Server, ServerRegistry, STANDALONE_SERVER_ID};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let server = Server::standalone();
        let _ = Execution::new(server);
        let _ = Purpose::Tuples;
    }
}
