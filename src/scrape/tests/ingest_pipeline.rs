use std::cell::Cell;

use chrono::{DateTime, Duration, Utc};
use common::model::{Exemplar, FloatHistogram, Histogram, Labels, MetricType, NativeHistogram};
use common::testing::TestConfigBuilder;
use scrape::testing::{
    MemoryAppender, OPENMETRICS_CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE, ScriptedEntry,
    ScriptedParserFactory, TextParserFactory,
};
use scrape::{IngestError, Ingester, NopMutator, ScrapeCache, StorageError, TargetLabelMutator};

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

fn text_ingester() -> Ingester<TextParserFactory, NopMutator> {
    Ingester::new(
        TextParserFactory,
        NopMutator,
        TestConfigBuilder::new().build_scrape(),
    )
}

#[test]
fn test_sample_limit_end_to_end() {
    let ingester = Ingester::new(
        TextParserFactory,
        NopMutator,
        TestConfigBuilder::new().sample_limit(1).build_scrape(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let err = ingester
        .ingest(
            &mut app,
            &mut cache,
            b"foo_count 0\nfoo_count 1\n# EOF",
            OPENMETRICS_CONTENT_TYPE,
            t0(),
        )
        .unwrap_err();

    assert_eq!(err.to_string(), "sample limit exceeded");
    assert_eq!(app.samples().len(), 1);
    assert_eq!(app.samples()[0].value, 0.0);
    assert_eq!(cache.series_len(), 1);
}

#[test]
fn test_sample_limit_takes_precedence_over_bucket_limit() {
    let wide = NativeHistogram::Float(FloatHistogram {
        positive_buckets: vec![1.0; 4],
        ..Default::default()
    });
    let parsers = ScriptedParserFactory::new(vec![
        ScriptedEntry::histogram(Labels::from_pairs(&[("__name__", "h")]), wide),
        ScriptedEntry::series(Labels::from_pairs(&[("__name__", "a")]), 1.0),
        ScriptedEntry::series(Labels::from_pairs(&[("__name__", "b")]), 1.0),
    ]);
    let ingester = Ingester::new(
        parsers,
        NopMutator,
        TestConfigBuilder::new()
            .sample_limit(1)
            .bucket_limit(2)
            .build_scrape(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let err = ingester
        .ingest(&mut app, &mut cache, b"scripted", "", t0())
        .unwrap_err();

    assert!(err.is_sample_limit());
    assert!(app.histograms().is_empty());
    assert_eq!(app.samples().len(), 1);
}

#[test]
fn test_bucket_limit_rejects_only_wide_histograms() {
    let narrow = NativeHistogram::Integer(Histogram {
        positive_buckets: vec![1, 2],
        ..Default::default()
    });
    let wide = NativeHistogram::Integer(Histogram {
        positive_buckets: vec![1, 2],
        negative_buckets: vec![1],
        ..Default::default()
    });
    let parsers = ScriptedParserFactory::new(vec![
        ScriptedEntry::histogram(Labels::from_pairs(&[("__name__", "narrow")]), narrow),
        ScriptedEntry::histogram(Labels::from_pairs(&[("__name__", "wide")]), wide),
    ]);
    let ingester = Ingester::new(
        parsers,
        NopMutator,
        TestConfigBuilder::new().bucket_limit(2).build_scrape(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let err = ingester
        .ingest(&mut app, &mut cache, b"scripted", "", t0())
        .unwrap_err();

    assert_eq!(
        err,
        IngestError::Storage(StorageError::BucketLimitExceeded)
    );
    assert_eq!(app.histograms().len(), 1);
    assert_eq!(app.histograms()[0].labels.metric_name(), Some("narrow"));
    // A breached limit skips the cache maintenance.
    assert_eq!(cache.iteration(), 0);
}

#[test]
fn test_series_over_the_limit_are_not_marked_stale() {
    let ingester = Ingester::new(
        TextParserFactory,
        NopMutator,
        TestConfigBuilder::new().sample_limit(2).build_scrape(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(&mut app, &mut cache, b"a 1\nb 1\n", PROMETHEUS_CONTENT_TYPE, t0())
        .unwrap();
    assert_eq!(cache.iteration(), 1);

    // "b" is still exposed but rejected by the limit.
    let t1 = t0() + Duration::seconds(15);
    let err = ingester
        .ingest(&mut app, &mut cache, b"c 1\na 2\nb 2\n", PROMETHEUS_CONTENT_TYPE, t1)
        .unwrap_err();
    assert!(err.is_sample_limit());
    assert_eq!(app.stale_markers().count(), 0);
    assert_eq!(cache.iteration(), 1);

    let t2 = t1 + Duration::seconds(15);
    ingester
        .ingest(&mut app, &mut cache, b"a 3\nb 3\n", PROMETHEUS_CONTENT_TYPE, t2)
        .unwrap();
    assert_eq!(app.stale_markers().count(), 0);
    assert_eq!(cache.iteration(), 2);
}

#[test]
fn test_every_vanished_series_is_marked_stale() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"a 1\nb 1\nc 1\nd 1 123\n",
            PROMETHEUS_CONTENT_TYPE,
            t0(),
        )
        .unwrap();
    app.clear();

    let t1 = t0() + Duration::seconds(15);
    ingester
        .ingest(&mut app, &mut cache, b"a 2\n", PROMETHEUS_CONTENT_TYPE, t1)
        .unwrap();

    let mut stale: Vec<_> = app
        .stale_markers()
        .map(|s| {
            assert_eq!(s.timestamp, t1.timestamp_millis());
            s.labels.metric_name().unwrap_or_default().to_string()
        })
        .collect();
    stale.sort();
    // "d" carried an explicit timestamp and is never tracked for staleness.
    assert_eq!(stale, vec!["b", "c"]);

    // Markers are written once, the next scrape has nothing left to mark.
    app.clear();
    let t2 = t1 + Duration::seconds(15);
    ingester
        .ingest(&mut app, &mut cache, b"a 3\n", PROMETHEUS_CONTENT_TYPE, t2)
        .unwrap();
    assert_eq!(app.stale_markers().count(), 0);
}

#[test]
fn test_dropped_series_skip_relabeling() {
    let calls = Cell::new(0);
    let mutator = |labels: Labels| {
        calls.set(calls.get() + 1);
        if labels.metric_name() == Some("debug_info") {
            Labels::empty()
        } else {
            labels
        }
    };
    let ingester = Ingester::new(
        TextParserFactory,
        mutator,
        TestConfigBuilder::new().build_scrape(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let payload = b"debug_info 1\nup 1\n";
    for i in 0..3 {
        let ts = t0() + Duration::seconds(i);
        ingester
            .ingest(&mut app, &mut cache, payload, PROMETHEUS_CONTENT_TYPE, ts)
            .unwrap();
    }

    // Both series are relabeled once, later scrapes hit the cache.
    assert_eq!(calls.get(), 2);
    assert_eq!(cache.dropped_len(), 1);
    assert!(
        app.samples()
            .iter()
            .all(|s| s.labels.metric_name() == Some("up"))
    );
}

#[test]
fn test_target_labels_and_conflicts() {
    let config = TestConfigBuilder::new()
        .with_target_label("job", "node")
        .with_target_label("instance", "host:9100")
        .dropping_metric("go_gc_duration_seconds")
        .build();
    let ingester = Ingester::new(
        TextParserFactory,
        TargetLabelMutator::from_config(&config),
        config.scrape.clone(),
    );
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"up{job=\"app\"} 1\ngo_gc_duration_seconds 0.1\n",
            PROMETHEUS_CONTENT_TYPE,
            t0(),
        )
        .unwrap();

    assert_eq!(app.samples().len(), 1);
    let labels = &app.samples()[0].labels;
    assert_eq!(labels.get("job"), Some("node"));
    assert_eq!(labels.get("exported_job"), Some("app"));
    assert_eq!(labels.get("instance"), Some("host:9100"));
    assert_eq!(cache.dropped_len(), 1);
}

#[test]
fn test_spellings_of_one_series_share_a_reference() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"m{a=\"1\",b=\"2\"} 1\n",
            PROMETHEUS_CONTENT_TYPE,
            t0(),
        )
        .unwrap();
    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"m{b=\"2\",a=\"1\"} 2\n",
            PROMETHEUS_CONTENT_TYPE,
            t0() + Duration::seconds(15),
        )
        .unwrap();

    assert_eq!(app.series_count(), 1);
    assert_eq!(app.samples()[0].series, app.samples()[1].series);
    // Only the spelling of the last scrape survives maintenance.
    assert_eq!(cache.series_len(), 1);
    assert_eq!(app.stale_markers().count(), 0);
}

#[test]
fn test_soft_rejections_do_not_fail_the_scrape() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new().rejecting("old", StorageError::OutOfBounds);
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"up 1\nold 1\n",
            PROMETHEUS_CONTENT_TYPE,
            t0(),
        )
        .unwrap();

    assert_eq!(app.samples().len(), 1);
    assert_eq!(cache.series_len(), 1);

    // Rewinding time makes the head reject the sample as out of order.
    ingester
        .ingest(
            &mut app,
            &mut cache,
            b"up 1\n",
            PROMETHEUS_CONTENT_TYPE,
            t0() - Duration::seconds(15),
        )
        .unwrap();
    assert_eq!(app.samples().len(), 1);
}

#[test]
fn test_invalid_label_name_is_fatal() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let err = ingester
        .ingest(
            &mut app,
            &mut cache,
            b"up 1\nbad{0label=\"x\"} 1\nlater 1\n",
            PROMETHEUS_CONTENT_TYPE,
            t0(),
        )
        .unwrap_err();

    assert!(matches!(err, IngestError::InvalidLabels(_)));
    assert_eq!(app.samples().len(), 1);
    assert_eq!(cache.iteration(), 0);
}

#[test]
fn test_metadata_reaches_storage_and_observers() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();
    let store = cache.metadata_store();

    let payload = b"# TYPE http_requests counter\n# HELP http_requests Requests served.\n# UNIT http_requests requests\nhttp_requests_total{code=\"200\"} 10\n# EOF\n";
    ingester
        .ingest(&mut app, &mut cache, payload, OPENMETRICS_CONTENT_TYPE, t0())
        .unwrap();

    let meta = store.get("http_requests").unwrap();
    assert_eq!(meta.metric_type, MetricType::Counter);
    assert_eq!(meta.help, "Requests served.");
    assert_eq!(meta.unit, "requests");

    // The sample name differs from the family name, so nothing matched it for storage.
    assert!(app.metadata().is_empty());

    let observer = std::thread::spawn(move || store.len());
    assert_eq!(observer.join().unwrap(), 1);
}

#[test]
fn test_metadata_forwarded_on_change_only() {
    let ingester = text_ingester();
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    let scrape = |help: &str| {
        format!("# TYPE temp gauge\n# HELP temp {help}\ntemp 21\n# EOF\n").into_bytes()
    };

    for (i, help) in ["Room temperature.", "Room temperature.", "Celsius."]
        .into_iter()
        .enumerate()
    {
        let ts = t0() + Duration::seconds(15 * i as i64);
        ingester
            .ingest(&mut app, &mut cache, &scrape(help), OPENMETRICS_CONTENT_TYPE, ts)
            .unwrap();
    }

    let forwarded: Vec<_> = app
        .metadata()
        .iter()
        .map(|m| m.metadata.help.as_str())
        .collect();
    // New series, then unchanged, then a changed help text.
    assert_eq!(forwarded, vec!["Room temperature.", "Celsius."]);
}

#[test]
fn test_exemplars_follow_their_sample() {
    let parsers = ScriptedParserFactory::new(vec![
        ScriptedEntry::series(Labels::from_pairs(&[("__name__", "req_total")]), 5.0)
            .with_exemplar(Exemplar {
                labels: Labels::from_pairs(&[("trace_id", "a")]),
                value: 1.0,
                timestamp: None,
            })
            .with_exemplar(Exemplar {
                labels: Labels::from_pairs(&[("trace_id", "b")]),
                value: 2.0,
                timestamp: Some(42),
            }),
    ]);
    let ingester = Ingester::new(parsers, NopMutator, TestConfigBuilder::new().build_scrape());
    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();

    ingester
        .ingest(&mut app, &mut cache, b"scripted", "", t0())
        .unwrap();

    let exemplars = app.exemplars();
    assert_eq!(exemplars.len(), 2);
    assert_eq!(exemplars[0].series, app.samples()[0].series);
    assert_eq!(exemplars[0].exemplar.timestamp, Some(t0().timestamp_millis()));
    assert_eq!(exemplars[1].exemplar.timestamp, Some(42));
}

#[test]
fn test_histograms_are_cached_and_tracked() {
    let histogram = NativeHistogram::Integer(Histogram {
        count: 3,
        sum: 1.5,
        positive_buckets: vec![1, 1, 1],
        ..Default::default()
    });
    let labels = Labels::from_pairs(&[("__name__", "latency_seconds")]);
    let with_histogram = ScriptedParserFactory::new(vec![ScriptedEntry::histogram(
        labels.clone(),
        histogram,
    )]);
    let without = ScriptedParserFactory::new(vec![ScriptedEntry::Comment]);

    let mut app = MemoryAppender::new();
    let mut cache = ScrapeCache::new();
    let config = TestConfigBuilder::new().build_scrape();

    Ingester::new(with_histogram, NopMutator, config.clone())
        .ingest(&mut app, &mut cache, b"scripted", "", t0())
        .unwrap();
    assert_eq!(app.histograms().len(), 1);
    assert_eq!(cache.series_len(), 1);

    Ingester::new(without, NopMutator, config)
        .ingest(&mut app, &mut cache, b"scripted", "", t0() + Duration::seconds(15))
        .unwrap();
    let stale: Vec<_> = app.stale_markers().collect();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].labels, labels);
}
