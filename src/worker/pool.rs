//! In-process worker fleet
//!
//! Spawns one OS thread per worker, each owning a `Worker` state machine
//! and a request channel. `broadcast` fans a message to every worker and
//! gathers the replies in worker order. This is the minimal spawn
//! plumbing an in-process fleet needs; cross-process transports live
//! outside the crate.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::filter::ScanSummary;
use crate::worker::{FilterJob, Request, Response, TableDescriptor, Worker};
use crate::{GridError, Result};

struct Envelope {
    request: Request,
    reply: mpsc::Sender<(usize, Response)>,
}

struct WorkerHandle {
    sender: mpsc::Sender<Envelope>,
    thread: JoinHandle<()>,
}

/// A fixed-size fleet of filter workers.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `count` worker threads.
    pub fn spawn(count: usize) -> Result<Self> {
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let (sender, receiver) = mpsc::channel::<Envelope>();
            let thread = thread::Builder::new()
                .name(format!("memgrid-worker-{id}"))
                .spawn(move || {
                    let mut worker = Worker::new();
                    while let Ok(envelope) = receiver.recv() {
                        let response = worker.handle(envelope.request);
                        if envelope.reply.send((id, response)).is_err() {
                            break;
                        }
                    }
                })?;
            workers.push(WorkerHandle { sender, thread });
        }
        log::debug!("spawned worker pool of {count}");
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Send `request` to every worker and collect the replies, indexed
    /// by worker. Blocks until all workers have answered.
    pub fn broadcast(&self, request: Request) -> Vec<Response> {
        let (reply, inbox) = mpsc::channel();
        let mut responses: Vec<Option<Response>> = Vec::new();
        responses.resize_with(self.workers.len(), || None);

        let mut pending = 0usize;
        for worker in &self.workers {
            let envelope = Envelope {
                request: request.clone(),
                reply: reply.clone(),
            };
            if worker.sender.send(envelope).is_ok() {
                pending += 1;
            }
        }
        drop(reply);

        for _ in 0..pending {
            match inbox.recv() {
                Ok((id, response)) => responses[id] = Some(response),
                Err(_) => break,
            }
        }
        responses
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Response::error("worker unavailable")))
            .collect()
    }

    /// Bind every worker to the source table.
    pub fn initialize(&self, table: &TableDescriptor) -> Result<()> {
        for response in self.broadcast(Request::Initialize {
            table: table.clone(),
        }) {
            if let Response::Error { reason } = response {
                return Err(GridError::Protocol(reason));
            }
        }
        Ok(())
    }

    /// Run one scan across the fleet and aggregate the per-worker
    /// summaries. Every worker shares the job's claim cursor, so the
    /// visited counts sum to the table's row count.
    pub fn process_filters(&self, job: &FilterJob) -> Result<ScanSummary> {
        let mut total = ScanSummary::default();
        for response in self.broadcast(Request::ProcessFilters { job: job.clone() }) {
            match response {
                Response::Success { .. } => {
                    if let Some(summary) = response.summary() {
                        total.rows_visited += summary.rows_visited;
                        total.rows_matched += summary.rows_matched;
                    }
                }
                Response::Error { reason } => return Err(GridError::Protocol(reason)),
            }
        }
        Ok(total)
    }

    /// Drop the request channels and join every worker thread.
    pub fn shutdown(self) {
        for worker in self.workers {
            // Closing the channel ends the worker loop.
            drop(worker.sender);
            if let Err(e) = worker.thread.join() {
                log::warn!("worker thread panicked: {e:?}");
            }
        }
    }
}

/// Initialize a fresh fleet against `source` and run `job` to
/// completion. One-shot: workers stay bound to `source` afterwards.
pub fn run_parallel_scan(
    pool: &WorkerPool,
    source: &TableDescriptor,
    job: &FilterJob,
) -> Result<ScanSummary> {
    pool.initialize(source)?;
    pool.process_filters(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterExpression, FilterOp, FilterRule, ResultColumn};
    use crate::memory::{ByteRegion, SharedBuffer};
    use crate::table::{ColumnDescriptor, ColumnType, Table};
    use crate::worker::RegionDescriptor;

    fn make_source(rows: u32) -> Table {
        let columns = vec![ColumnDescriptor::new("id", ColumnType::Uint32).unwrap()];
        let buffer = SharedBuffer::anonymous(64 + rows as usize * 4).unwrap();
        let table = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
        let id = table.schema().index_of("id").unwrap();
        table.add_rows(rows).unwrap();
        for i in 0..rows {
            table.row(i).set_u32(id, i);
        }
        table
    }

    fn make_job(expression: FilterExpression, capacity: u32, batch: u32) -> (Table, FilterJob) {
        let columns = vec![
            ColumnDescriptor::new("id", ColumnType::Uint32).unwrap(),
            ColumnDescriptor::new("", ColumnType::Uint32).unwrap(),
        ];
        let buffer = SharedBuffer::anonymous(128 + capacity as usize * 8).unwrap();
        let result = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
        let indices = ByteRegion::whole(SharedBuffer::anonymous(8).unwrap());
        let job = FilterJob {
            expression,
            result: vec![ResultColumn::copy("id", "id"), ResultColumn::row_index()],
            result_table: TableDescriptor::for_table(&result),
            indices: RegionDescriptor::for_region(&indices),
            row_batch_size: batch,
        };
        (result, job)
    }

    #[test]
    fn test_fleet_scan_partitions_rows() {
        let source = make_source(200);
        let expression = FilterExpression::dnf(vec![vec![FilterRule::new(
            "id",
            FilterOp::LessThan,
            "50",
        )]]);
        let (result, job) = make_job(expression, 200, 7);

        let pool = WorkerPool::spawn(4).unwrap();
        let summary =
            run_parallel_scan(&pool, &TableDescriptor::for_table(&source), &job).unwrap();
        pool.shutdown();

        // Claims partition the table: visited counts sum exactly.
        assert_eq!(summary.rows_visited, 200);
        assert_eq!(summary.rows_matched, 50);
        assert_eq!(result.row_count(), 50);
    }

    #[test]
    fn test_initialize_twice_is_an_error() {
        let source = make_source(10);
        let descriptor = TableDescriptor::for_table(&source);
        let pool = WorkerPool::spawn(2).unwrap();

        pool.initialize(&descriptor).unwrap();
        assert!(matches!(
            pool.initialize(&descriptor),
            Err(GridError::Protocol(_))
        ));
        pool.shutdown();
    }

    #[test]
    fn test_broadcast_orders_replies_by_worker() {
        let pool = WorkerPool::spawn(3).unwrap();
        let responses = pool.broadcast(Request::FetchMemory);
        assert_eq!(responses.len(), 3);
        // All uninitialized: every reply is an error.
        assert!(responses
            .iter()
            .all(|r| matches!(r, Response::Error { .. })));
        pool.shutdown();
    }
}
