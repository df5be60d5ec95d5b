//! End-to-end scan scenarios: a coordinator builds source and result
//! tables in shared buffers, spawns a worker fleet, and drives the
//! message protocol.

use memgrid::{
    run_parallel_scan, ByteRegion, ColumnDescriptor, ColumnType, FilterExpression, FilterJob,
    FilterMode, FilterOp, FilterRule, RegionDescriptor, ResultColumn, SharedBuffer, Table,
    TableDescriptor, WorkerPool,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn id_name_table(rows: &[(u32, &str)]) -> Table {
    let columns = vec![
        ColumnDescriptor::new("id", ColumnType::Uint32).unwrap(),
        ColumnDescriptor::byte_string("name", 16).unwrap(),
    ];
    let buffer = SharedBuffer::anonymous(4096).unwrap();
    let table = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
    let id = table.schema().index_of("id").unwrap();
    let name = table.schema().index_of("name").unwrap();
    table.add_rows(rows.len() as u32).unwrap();
    for (i, (value, text)) in rows.iter().enumerate() {
        let row = table.row(i as u32);
        row.set_u32(id, *value);
        row.set_text(name, text).unwrap();
    }
    table
}

fn id_only_table(count: u32) -> Table {
    let columns = vec![ColumnDescriptor::new("id", ColumnType::Uint32).unwrap()];
    let buffer = SharedBuffer::anonymous(256 + count as usize * 4).unwrap();
    let table = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
    let id = table.schema().index_of("id").unwrap();
    table.add_rows(count).unwrap();
    for i in 0..count {
        table.row(i).set_u32(id, i);
    }
    table
}

/// Result table with an `id` copy column and the empty-named row-index
/// column, plus a fresh claim-cursor region.
fn result_and_job(expression: FilterExpression, capacity: u32, batch: u32) -> (Table, FilterJob) {
    let columns = vec![
        ColumnDescriptor::new("id", ColumnType::Uint32).unwrap(),
        ColumnDescriptor::new("", ColumnType::Uint32).unwrap(),
    ];
    let buffer = SharedBuffer::anonymous(256 + capacity as usize * 8).unwrap();
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

fn scan_with_fleet(source: &Table, job: &FilterJob, workers: usize) {
    let pool = WorkerPool::spawn(workers).unwrap();
    run_parallel_scan(&pool, &TableDescriptor::for_table(source), job).unwrap();
    pool.shutdown();
}

fn result_id_bag(result: &Table) -> Vec<u32> {
    let id = result.schema().index_of("id").unwrap();
    let mut ids = Vec::new();
    result.for_each(|row| ids.push(row.get_u32(id)));
    ids.sort_unstable();
    ids
}

// Values written through the row cursor read back bit-exact.
#[test]
fn scenario_round_trip() {
    init_logging();
    let table = id_name_table(&[(1, "Ada"), (2, "Bob"), (3, "Cid")]);

    assert_eq!(table.row_count(), 3);
    let name = table.schema().index_of("name").unwrap();
    assert_eq!(table.row(1).text(name), "Bob");
}

// DNF: id == 1 OR name contains "c" ("Cid" matches case-insensitively).
#[test]
fn scenario_dnf_filter() {
    init_logging();
    let source = id_name_table(&[(1, "Ada"), (2, "Bob"), (3, "Cid")]);
    let expression = FilterExpression::dnf(vec![
        vec![FilterRule::new("id", FilterOp::Equal, "1")],
        vec![FilterRule::new("name", FilterOp::Contains, "c")],
    ]);
    let (result, job) = result_and_job(expression, 8, 1);

    scan_with_fleet(&source, &job, 2);
    assert_eq!(result_id_bag(&result), [1, 3]);
}

// CNF: id > 1 AND name notContains "b".
#[test]
fn scenario_cnf_filter() {
    init_logging();
    let source = id_name_table(&[(1, "Ada"), (2, "Bob"), (3, "Cid")]);
    let expression = FilterExpression::cnf(vec![
        vec![FilterRule::new("id", FilterOp::GreaterThan, "1")],
        vec![FilterRule::new("name", FilterOp::NotContains, "b")],
    ]);
    let (result, job) = result_and_job(expression, 8, 2);

    scan_with_fleet(&source, &job, 2);
    assert_eq!(result_id_bag(&result), [3]);
}

// An in-set over 1000 rows; "1000" is outside the table.
#[test]
fn scenario_in_filter() {
    init_logging();
    let source = id_only_table(1000);
    let expression = FilterExpression::dnf(vec![vec![FilterRule::with_values(
        "id",
        FilterOp::In,
        &["7", "42", "999", "1000"],
    )]]);
    let (result, job) = result_and_job(expression, 16, 64);

    scan_with_fleet(&source, &job, 4);
    assert_eq!(result_id_bag(&result), [7, 42, 999]);
}

// The result bag is independent of worker count and batch size.
#[test]
fn scenario_parallel_determinism() {
    init_logging();
    let source = id_only_table(1000);

    for workers in [1usize, 4, 16] {
        for batch in [1u32, 7, 128] {
            let expression = FilterExpression::dnf(vec![vec![FilterRule::with_values(
                "id",
                FilterOp::In,
                &["7", "42", "999", "1000"],
            )]]);
            let (result, job) = result_and_job(expression, 16, batch);

            scan_with_fleet(&source, &job, workers);
            assert_eq!(
                result_id_bag(&result),
                [7, 42, 999],
                "workers={workers} batch={batch}"
            );
            assert_eq!(result.row_count(), 3);
        }
    }
}

// Copy column plus row index: result rows hold (source id, source index).
#[test]
fn scenario_result_row_index() {
    init_logging();
    let source = id_name_table(&[(10, "Ada"), (20, "Bob"), (30, "Cid")]);
    let expression = FilterExpression::dnf(vec![vec![FilterRule::new(
        "id",
        FilterOp::GreaterThan,
        "10",
    )]]);
    let (result, job) = result_and_job(expression, 8, 1);

    scan_with_fleet(&source, &job, 2);

    let id = result.schema().index_of("id").unwrap();
    let index = result.schema().index_of("").unwrap();
    let mut pairs = Vec::new();
    result.for_each(|row| pairs.push((row.get_u32(id), row.get_u32(index))));
    pairs.sort_unstable();
    assert_eq!(pairs, [(20, 1), (30, 2)]);
}

// DNF and CNF agree with the standard normal-form semantics: the same
// literals reshaped through De Morgan select complementary row sets.
#[test]
fn dnf_cnf_duality() {
    init_logging();
    let source = id_only_table(100);

    // E (DNF): id < 10 OR id >= 90
    let dnf = FilterExpression::dnf(vec![
        vec![FilterRule::new("id", FilterOp::LessThan, "10")],
        vec![FilterRule::new("id", FilterOp::GreaterThanOrEqual, "90")],
    ]);
    // NOT E (CNF): id >= 10 AND id < 90
    let dual = FilterExpression::cnf(vec![
        vec![FilterRule::new("id", FilterOp::GreaterThanOrEqual, "10")],
        vec![FilterRule::new("id", FilterOp::LessThan, "90")],
    ]);

    let (result_a, job_a) = result_and_job(dnf, 128, 8);
    scan_with_fleet(&source, &job_a, 3);
    let selected = result_id_bag(&result_a);

    let (result_b, job_b) = result_and_job(dual, 128, 8);
    scan_with_fleet(&source, &job_b, 3);
    let complement = result_id_bag(&result_b);

    assert_eq!(selected.len() + complement.len(), 100);
    let mut all: Vec<u32> = selected.into_iter().chain(complement).collect();
    all.sort_unstable();
    assert_eq!(all, (0..100).collect::<Vec<_>>());
}

// The filter expression can arrive over the documented JSON wire form.
#[test]
fn wire_form_drives_a_scan() {
    init_logging();
    let source = id_name_table(&[(1, "Ada"), (2, "Bob"), (3, "Cid")]);

    let expression: FilterExpression = serde_json::from_str(
        r#"{ "mode": "CNF",
             "clauses": [[ { "field": "id", "operation": "greaterThan", "value": "1" } ],
                         [ { "field": "name", "operation": "notContains", "value": "b" } ]] }"#,
    )
    .unwrap();
    assert_eq!(expression.mode, FilterMode::Cnf);

    let (result, job) = result_and_job(expression, 8, 3);
    scan_with_fleet(&source, &job, 2);
    assert_eq!(result_id_bag(&result), [3]);
}

// An empty expression selects every row.
#[test]
fn empty_expression_selects_all() {
    init_logging();
    let source = id_only_table(50);
    let (result, job) = result_and_job(FilterExpression::dnf(vec![]), 64, 9);

    scan_with_fleet(&source, &job, 3);
    assert_eq!(result.row_count(), 50);
    assert_eq!(result_id_bag(&result), (0..50).collect::<Vec<_>>());
}

// A table stamped in a file-backed buffer scans like an anonymous one.
#[test]
fn file_backed_source_table() {
    init_logging();
    let file = tempfile::tempfile().unwrap();
    let buffer = SharedBuffer::file_backed(&file, 4096).unwrap();
    let columns = vec![ColumnDescriptor::new("id", ColumnType::Uint32).unwrap()];
    let source = Table::create(&columns, ByteRegion::whole(buffer)).unwrap();
    let id = source.schema().index_of("id").unwrap();
    source.add_rows(8).unwrap();
    for i in 0..8 {
        source.row(i).set_u32(id, i * 3);
    }

    let expression = FilterExpression::dnf(vec![vec![FilterRule::new(
        "id",
        FilterOp::GreaterThanOrEqual,
        "12",
    )]]);
    let (result, job) = result_and_job(expression, 16, 2);
    scan_with_fleet(&source, &job, 2);
    assert_eq!(result_id_bag(&result), [12, 15, 18, 21]);
}
