// Integration tests for nearspot
use nearspot::ingest::{self, AddressStreamWriter, LoaderConfig};
use nearspot::{
    fit_viewport, AddressRecord, CoordinatorConfig, EmbeddingProvider, GeoIndex, GeoPoint,
    HashingEmbedder, NearestOutcome, PointOfInterest, QueryCoordinator, VectorIndex,
    VectorIndexConfig,
};
use nearspot_core::Vector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DIM: usize = 256;

fn random_pois(n: u64, seed: u64) -> Vec<PointOfInterest> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|id| {
            let lat = rng.random_range(43.0..50.0);
            let lon = rng.random_range(-1.0..7.0);
            PointOfInterest::new(id, GeoPoint::new(lat, lon).unwrap())
        })
        .collect()
}

fn write_poi_export(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("toilets.json");
    let mut file = std::fs::File::create(&path).unwrap();
    let lines = [
        r#"{"type":"node","lat":48.8584,"lon":2.2945,"tags":{"fee":"yes","wheelchair":"yes"}}"#,
        r#"{"type":"node","lat":48.8606,"lon":2.3376,"tags":{"access":"customers"}}"#,
        r#"{"type":"way","centroid":{"lat":48.8530,"lon":2.3499},"tags":{"access":"public"}}"#,
        r#"{"type":"node","lat":45.7578,"lon":4.8320,"tags":{}}"#,
        r#"{"broken"#,
    ];
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn write_address_stream(dir: &std::path::Path, embedder: &HashingEmbedder) -> std::path::PathBuf {
    let path = dir.join("addresses.bin");
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = AddressStreamWriter::new(std::io::BufWriter::new(file));
    let addresses = [
        ("12 Rue de Rivoli Paris", 48.8556, 2.3601),
        ("5 Avenue Anatole France Paris", 48.8583, 2.2945),
        ("1 Place Bellecour Lyon", 45.7578, 4.8320),
        ("10 Quai du Port Marseille", 43.2965, 5.3698),
    ];
    for (label, lat, lon) in addresses {
        let embedding = embedder.embed(label).unwrap();
        writer
            .write_record(label, &GeoPoint::new(lat, lon).unwrap(), &embedding)
            .unwrap();
    }
    writer.finish().unwrap();
    path
}

#[test]
fn test_end_to_end_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = HashingEmbedder::new(DIM);

    let (pois, poi_report) = ingest::load_pois(write_poi_export(dir.path())).unwrap();
    assert_eq!(poi_report.decoded, 3);
    assert_eq!(poi_report.filtered, 1);
    assert_eq!(poi_report.skipped_corrupt, 1);

    let config = LoaderConfig { batch_size: 3, expected_dim: Some(DIM) };
    let (records, address_report) =
        ingest::load_addresses(write_address_stream(dir.path(), &embedder), &config).unwrap();
    assert_eq!(address_report.decoded, 4);

    let geo = Arc::new(GeoIndex::default());
    geo.build(pois).unwrap();
    let vectors = Arc::new(VectorIndex::new(VectorIndexConfig { dim: DIM, ..Default::default() }));
    vectors.build(records).unwrap();
    let coordinator = QueryCoordinator::new(geo, vectors, Arc::new(embedder), CoordinatorConfig::default());

    let here = GeoPoint::new(48.8566, 2.3522).unwrap();
    match coordinator.nearest_poi(&here).unwrap() {
        NearestOutcome::Found { results, viewport } => {
            // Lyon is ~390 km away, the private node is filtered
            let ids: Vec<u64> = results.iter().map(|r| r.poi.id).collect();
            assert_eq!(ids, vec![2, 0]);
            assert!(viewport.zoom > 10.0);
        }
        NearestOutcome::NoResults => panic!("expected results near Paris"),
    }

    let suggestions = coordinator.suggest_addresses("rue de rivoli").unwrap();
    assert_eq!(suggestions.len(), 4);
    assert_eq!(suggestions[0].label, "12 Rue de Rivoli Paris");
    assert_eq!(suggestions[0].coordinate, GeoPoint::new(48.8556, 2.3601).unwrap());
}

#[test]
fn test_radius_query_matches_brute_force() {
    let pois = random_pois(3000, 1);
    let geo = GeoIndex::default();
    geo.build(pois.clone()).unwrap();

    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..25 {
        let center = GeoPoint::new(rng.random_range(43.0..50.0), rng.random_range(-1.0..7.0)).unwrap();
        let radius = rng.random_range(1.0..150.0);

        let mut expected: Vec<(f64, u64)> = pois
            .iter()
            .map(|p| (center.distance_km(&p.coordinate), p.id))
            .filter(|(d, _)| *d <= radius)
            .collect();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        expected.truncate(20);

        let got = geo.radius_query(&center, radius, 20).unwrap();
        let got: Vec<u64> = got.iter().map(|r| r.poi.id).collect();
        let expected: Vec<u64> = expected.iter().map(|(_, id)| *id).collect();
        assert_eq!(got, expected);
    }
}

#[test]
fn test_top_k_exact_count_and_order() {
    let mut rng = StdRng::seed_from_u64(3);
    let dim = 32;
    let records: Vec<AddressRecord> = (0..2000u64)
        .map(|id| {
            let embedding: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect();
            AddressRecord::new(id, format!("addr {id}"), GeoPoint::new(0.0, 0.0).unwrap(), Vector::new(embedding))
        })
        .collect();
    let index = VectorIndex::new(VectorIndexConfig { dim, ..Default::default() });
    index.build(records).unwrap();

    for _ in 0..10 {
        let q: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect();
        let results = index.top_k(&q, 10, 100).unwrap();
        assert_eq!(results.len(), 10);
        for w in results.windows(2) {
            assert!(w[0].score > w[1].score || (w[0].score == w[1].score && w[0].record.id < w[1].record.id));
        }
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let pois = random_pois(500, 4);
    let geo = GeoIndex::default();
    geo.build(pois.clone()).unwrap();
    let center = GeoPoint::new(46.5, 3.0).unwrap();
    let first = geo.radius_query(&center, 100.0, 20).unwrap();

    geo.build(pois).unwrap();
    assert_eq!(geo.radius_query(&center, 100.0, 20).unwrap(), first);
}

#[test]
fn test_readers_never_see_a_mixed_snapshot() {
    // Generation A has ids below 1000, generation B at or above
    let make = |offset: u64| -> Vec<PointOfInterest> {
        random_pois(400, offset)
            .into_iter()
            .map(|p| PointOfInterest::new(p.id + offset, p.coordinate))
            .collect()
    };
    let gen_a = make(0);
    let gen_b = make(1000);

    let geo = Arc::new(GeoIndex::default());
    geo.build(gen_a.clone()).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let center = GeoPoint::new(46.5, 3.0).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let geo = geo.clone();
            let stop = stop.clone();
            s.spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let results = geo.radius_query(&center, 1000.0, 400).unwrap();
                    assert_eq!(results.len(), 400);
                    let low = results.iter().filter(|r| r.poi.id < 1000).count();
                    assert!(low == 0 || low == 400, "mixed snapshot: {low} old of 400");
                }
            });
        }
        for round in 0..50 {
            let next = if round % 2 == 0 { gen_b.clone() } else { gen_a.clone() };
            geo.build(next).unwrap();
        }
        stop.store(true, Ordering::Relaxed);
    });
}

#[test]
fn test_vector_readers_never_see_a_mixed_snapshot() {
    let dim = 16;
    let make = |offset: u64| -> Vec<AddressRecord> {
        let mut rng = StdRng::seed_from_u64(offset + 7);
        (offset..offset + 300)
            .map(|id| {
                let embedding: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect();
                AddressRecord::new(id, format!("addr {id}"), GeoPoint::new(0.0, 0.0).unwrap(), Vector::new(embedding))
            })
            .collect()
    };
    // Generation A has ids below 1000, generation B at or above; each is
    // published as a build of 200 records followed by an extend of 100
    let (gen_a, gen_b) = (make(0), make(1000));
    let (a_head, a_tail) = (gen_a[..200].to_vec(), gen_a[200..].to_vec());
    let (b_head, b_tail) = (gen_b[..200].to_vec(), gen_b[200..].to_vec());

    let index = Arc::new(VectorIndex::new(VectorIndexConfig { dim, ..Default::default() }));
    index.build(a_head.clone()).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    std::thread::scope(|s| {
        for seed in 0..4u64 {
            let index = index.clone();
            let stop = stop.clone();
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + seed);
                while !stop.load(Ordering::Relaxed) {
                    let query: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect();
                    let results = index.top_k(&query, 10, 50).unwrap();
                    assert_eq!(results.len(), 10);
                    let low = results.iter().filter(|m| m.record.id < 1000).count();
                    assert!(low == 0 || low == 10, "mixed snapshot: {low} old of 10");
                }
            });
        }
        for round in 0..20 {
            let (head, tail) = if round % 2 == 0 { (&b_head, &b_tail) } else { (&a_head, &a_tail) };
            index.build(head.clone()).unwrap();
            index.extend(tail.clone()).unwrap();
        }
        stop.store(true, Ordering::Relaxed);
    });
    assert_eq!(index.len(), 300);
}

#[test]
fn test_viewport_fixture_through_reexport() {
    let points = [
        GeoPoint::from_lon_lat(-109.031387, 25.587101).unwrap(),
        GeoPoint::from_lon_lat(-103.385460, 31.784620).unwrap(),
    ];
    let vp = fit_viewport(&points, 2.0).unwrap();
    assert_eq!(vp.zoom, 5.75);
    assert_eq!((vp.center.lon(), vp.center.lat()), (-106.208423, 28.685861));
}
