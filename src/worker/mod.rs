//! Worker message protocol
//!
//! Logical messages between a coordinator and its filter workers. The
//! transport is not this crate's concern; in-process fleets move these
//! over plain channels (see `WorkerPool`). Descriptors are locators into
//! shared buffers, never copies of table data.
//!
//! Worker lifecycle: created → `Initialize` binds the source table →
//! any number of `ProcessFilters` → `FetchMemory` surrenders the buffer
//! and terminates the worker. Every recoverable failure is answered as
//! `Response::Error` with the worker state unchanged.

mod pool;

pub use pool::{run_parallel_scan, WorkerPool};

use std::sync::Arc;

use crate::filter::{FilterExpression, FilterProcessor, ResultDescription, ScanSummary};
use crate::memory::{ByteRegion, SharedBuffer};
use crate::table::Table;
use crate::Result;

/// Locates a raw byte range within a shared buffer.
#[derive(Clone)]
pub struct RegionDescriptor {
    pub buffer: Arc<SharedBuffer>,
    pub address: u32,
    pub size: u32,
}

impl RegionDescriptor {
    pub fn new(buffer: Arc<SharedBuffer>, address: u32, size: u32) -> Self {
        Self {
            buffer,
            address,
            size,
        }
    }

    pub fn for_region(region: &ByteRegion) -> Self {
        Self {
            buffer: Arc::clone(region.buffer()),
            address: region.address() as u32,
            size: region.size() as u32,
        }
    }

    pub fn to_region(&self) -> Result<ByteRegion> {
        ByteRegion::new(
            Arc::clone(&self.buffer),
            self.address as usize,
            self.size as usize,
        )
    }
}

impl std::fmt::Debug for RegionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionDescriptor")
            .field("address", &self.address)
            .field("size", &self.size)
            .finish()
    }
}

/// Locates a table: a shared buffer plus the byte range whose start is
/// the table header.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub region: RegionDescriptor,
}

impl TableDescriptor {
    pub fn new(buffer: Arc<SharedBuffer>, address: u32, size: u32) -> Self {
        Self {
            region: RegionDescriptor::new(buffer, address, size),
        }
    }

    pub fn for_table(table: &Table) -> Self {
        Self {
            region: RegionDescriptor::for_region(table.region()),
        }
    }

    /// Reconstruct a table view over the shared bytes. No data is copied.
    pub fn attach(&self) -> Result<Table> {
        Table::attach(self.region.to_region()?)
    }
}

/// Everything a worker needs to run one scan.
#[derive(Debug, Clone)]
pub struct FilterJob {
    pub expression: FilterExpression,
    pub result: ResultDescription,
    pub result_table: TableDescriptor,
    /// Shared claim-cursor region; at least two u32 slots, slot 0 is the
    /// cursor.
    pub indices: RegionDescriptor,
    pub row_batch_size: u32,
}

/// Inbound worker messages.
#[derive(Debug, Clone)]
pub enum Request {
    Initialize { table: TableDescriptor },
    ProcessFilters { job: FilterJob },
    FetchMemory,
}

/// Outbound worker messages.
#[derive(Debug, Clone)]
pub enum Response {
    Success { data: Option<ResponseData> },
    Error { reason: String },
}

/// Payload of a successful reply.
#[derive(Debug, Clone)]
pub enum ResponseData {
    Summary(ScanSummary),
    Memory(Arc<SharedBuffer>),
}

impl Response {
    pub fn success() -> Self {
        Response::Success { data: None }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Response::Error {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }

    pub fn summary(&self) -> Option<ScanSummary> {
        match self {
            Response::Success {
                data: Some(ResponseData::Summary(summary)),
            } => Some(*summary),
            _ => None,
        }
    }
}

/// Per-worker state machine: holds at most one processor, bound once.
pub struct Worker {
    processor: Option<FilterProcessor>,
    terminated: bool,
}

impl Worker {
    pub fn new() -> Self {
        Self {
            processor: None,
            terminated: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.processor.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Dispatch one message. Failures never change worker state.
    pub fn handle(&mut self, request: Request) -> Response {
        if self.terminated {
            return Response::error("worker is terminated");
        }
        match request {
            Request::Initialize { table } => {
                if self.processor.is_some() {
                    return Response::error("worker is already initialized");
                }
                match table.attach() {
                    Ok(table) => {
                        log::debug!(
                            "worker initialized: {} columns, {} rows",
                            table.schema().column_count(),
                            table.row_count()
                        );
                        self.processor = Some(FilterProcessor::new(table));
                        Response::success()
                    }
                    Err(e) => Response::error(e.to_string()),
                }
            }
            Request::ProcessFilters { job } => {
                let Some(processor) = self.processor.as_ref() else {
                    return Response::error("worker is not initialized");
                };
                match Self::run_job(processor, &job) {
                    Ok(summary) => Response::Success {
                        data: Some(ResponseData::Summary(summary)),
                    },
                    Err(e) => Response::error(e.to_string()),
                }
            }
            Request::FetchMemory => {
                let Some(processor) = self.processor.take() else {
                    return Response::error("worker is not initialized");
                };
                self.terminated = true;
                Response::Success {
                    data: Some(ResponseData::Memory(processor.fetch_memory())),
                }
            }
        }
    }

    fn run_job(processor: &FilterProcessor, job: &FilterJob) -> Result<ScanSummary> {
        let result_table = job.result_table.attach()?;
        let indices = job.indices.to_region()?;
        processor.process_filters(
            &job.expression,
            &job.result,
            result_table,
            &indices,
            job.row_batch_size,
        )
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}
