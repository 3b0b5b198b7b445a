use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pulto_engine::import::import_delimited;
use pulto_engine::inference::infer_column_type;
use pulto_engine::{recommend_for_table, Table, TableView};

fn sales_csv(rows: usize) -> String {
    let mut text = String::from("date,region,units,price,promo\n");
    let regions = ["North", "South", "East", "West"];
    for i in 0..rows {
        text.push_str(&format!(
            "2024-{:02}-{:02},{},{},{:.2},{}\n",
            i % 12 + 1,
            i % 28 + 1,
            regions[i % regions.len()],
            (i * 7) % 500,
            (i as f64 * 1.37) % 100.0,
            i % 3 == 0
        ));
    }
    text
}

fn sales_table(rows: usize) -> Table {
    import_delimited("sales", &sales_csv(rows), ',', true).unwrap()
}

fn bench_infer_column_type(c: &mut Criterion) {
    let mut group = c.benchmark_group("infer_column_type");

    for size in [100, 1000, 10000].iter() {
        let numeric: Vec<String> = (0..*size).map(|i| format!("{}.5", i)).collect();
        let text: Vec<String> = (0..*size).map(|i| format!("item-{}", i)).collect();

        group.bench_with_input(BenchmarkId::new("numeric", size), size, |b, _| {
            b.iter(|| infer_column_type("n", black_box(&numeric)));
        });
        group.bench_with_input(BenchmarkId::new("text", size), size, |b, _| {
            b.iter(|| infer_column_type("t", black_box(&text)));
        });
    }
    group.finish();
}

fn bench_import_delimited(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_delimited");

    for size in [100, 1000, 10000].iter() {
        let text = sales_csv(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| import_delimited("sales", black_box(&text), ',', true).unwrap());
        });
    }
    group.finish();
}

fn bench_filter_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_view");

    for size in [100, 1000, 10000].iter() {
        let table = sales_table(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| TableView::filter(&table, black_box("north")).row_count());
        });
    }
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");

    for size in [100, 1000, 10000].iter() {
        let table = sales_table(*size);
        group.bench_with_input(BenchmarkId::new("table_sort", size), size, |b, _| {
            b.iter(|| {
                let mut copy = table.clone();
                copy.sort(black_box("price"), false).unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("view_sort", size), size, |b, _| {
            b.iter(|| {
                TableView::all(&table)
                    .sorted_by(black_box("price"), false)
                    .unwrap()
                    .row_count()
            });
        });
    }
    group.finish();
}

fn bench_recommend(c: &mut Criterion) {
    let table = sales_table(10000);
    c.bench_function("recommend_10000_rows", |b| {
        b.iter(|| recommend_for_table(black_box(&table)));
    });
}

criterion_group!(
    benches,
    bench_infer_column_type,
    bench_import_delimited,
    bench_filter_view,
    bench_sort,
    bench_recommend
);
criterion_main!(benches);
