//! Workload orchestrator.
//!
//! This module builds an allocation engine from a pool configuration, replays
//! its scripted operations in order and collects the outcome of each one into
//! a serializable report.

use crate::config::{Config, Operation};
use crate::ip::{AllocationEngine, LeaseError};
use crate::utils::ip_utils::{format_ipv4, parse_ipv4};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Serialize;
use std::path::Path;

/// Outcome status of a single operation
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    Full,
    MemoryFailure,
    DoubleFree,
    BadSubnet,
}

impl From<&LeaseError> for OperationStatus {
    fn from(error: &LeaseError) -> Self {
        match error {
            LeaseError::Full => OperationStatus::Full,
            LeaseError::DoubleFree { .. } => OperationStatus::DoubleFree,
            LeaseError::BadSubnet { .. } => OperationStatus::BadSubnet,
            LeaseError::MemoryFailure | LeaseError::InvalidPrefix { .. } => OperationStatus::MemoryFailure,
        }
    }
}

/// Record of one replayed operation
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct OperationOutcome {
    pub operation: Operation,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub free_after: u64,
}

/// Summary written after a replay
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ReplayReport {
    pub subnet: String,
    pub capacity: u64,
    pub free_at_start: u64,
    pub free_at_end: u64,
    pub outcomes: Vec<OperationOutcome>,
}

/// Build the engine described by `config`
pub fn build_engine(config: &Config) -> Result<AllocationEngine> {
    let (base, prefix) = config.subnet_parts()?;
    AllocationEngine::new(base, prefix)
        .wrap_err_with(|| format!("Failed to create allocation engine for subnet {}", config.subnet))
}

/// Replay every scripted operation against `engine`
///
/// Allocation and free failures are recorded in the report rather than
/// aborting the replay.
pub fn replay(engine: &mut AllocationEngine, operations: &[Operation]) -> Result<ReplayReport> {
    let free_at_start = engine.count_free();
    let mut outcomes = Vec::with_capacity(operations.len());

    for operation in operations {
        let (status, address) = match operation {
            Operation::Allocate { allocate } => {
                let requested = allocate.as_deref().map(parse_ipv4).transpose().map_err(color_eyre::eyre::Report::msg)?;
                match engine.allocate_ip(requested) {
                    Ok(granted) => {
                        log::info!("Allocated {}", format_ipv4(granted));
                        (OperationStatus::Success, Some(format_ipv4(granted)))
                    }
                    Err(e) => {
                        log::warn!("Allocation failed: {}", e);
                        (OperationStatus::from(&e), None)
                    }
                }
            }
            Operation::Free { free } => {
                let address = parse_ipv4(free).map_err(color_eyre::eyre::Report::msg)?;
                match engine.free_ip(address) {
                    Ok(()) => {
                        log::info!("Freed {}", free);
                        (OperationStatus::Success, Some(free.clone()))
                    }
                    Err(e) => {
                        log::warn!("Free failed: {}", e);
                        (OperationStatus::from(&e), Some(free.clone()))
                    }
                }
            }
        };

        outcomes.push(OperationOutcome {
            operation: operation.clone(),
            status,
            address,
            free_after: engine.count_free(),
        });
    }

    Ok(ReplayReport {
        subnet: engine.subnet(),
        capacity: engine.capacity(),
        free_at_start,
        free_at_end: engine.count_free(),
        outcomes,
    })
}

/// Write a replay report as pretty-printed JSON
pub fn write_report(report: &ReplayReport, output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).wrap_err("Failed to serialize replay report")?;
    std::fs::write(output, json)
        .wrap_err_with(|| format!("Failed to write report to '{}'", output.display()))?;
    log::info!("Wrote replay report to {:?}", output);
    Ok(())
}
