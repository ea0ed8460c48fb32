use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parking_forecast::{
    FeatureBuilder, FeatureConfig, ForecastTrainer, Ingestor, IngestConfig, Measurement, RawRecord,
    Series, TrainerConfig,
};

fn week_of_measurements() -> Series {
    let start = NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let measurements = (0..7 * 288)
        .map(|i: i64| {
            let hour = (i % 288) / 12;
            let free = if (8..18).contains(&hour) { 4 + i % 5 } else { 40 + i % 3 };
            Measurement::new("103", start + Duration::minutes(5 * i), free as u32, 50 - free as u32)
        })
        .collect();
    Series::new("103", measurements)
}

fn raw_day() -> Vec<RawRecord> {
    (0..288)
        .flat_map(|i: u32| {
            let ts = format!("2024-05-06 {:02}:{:02}:00.000+0000", i / 12, (i % 12) * 5);
            [
                RawRecord::new(ts.clone(), "free", f64::from(i % 50)),
                RawRecord::new(ts, "occupied", f64::from(50 - i % 50)),
            ]
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let series = week_of_measurements();
    let records = raw_day();
    let ingestor = Ingestor::new(&IngestConfig::default());
    let builder = FeatureBuilder::new(FeatureConfig::default());
    let trainer = ForecastTrainer::new(
        FeatureConfig::default(),
        TrainerConfig::default().with_n_estimators(20),
    );

    c.bench_function("ingest_day", |b| {
        b.iter(|| ingestor.ingest(black_box("103"), black_box(&records)))
    });
    c.bench_function("build_features_week", |b| {
        b.iter(|| builder.build(black_box(&series)))
    });

    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    group.bench_function("train_week_20_trees", |b| {
        b.iter(|| trainer.train_series(black_box(&series)))
    });
    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
