use catalog::Snapshot;
use foundation::math::Mat4;
use foundation::{LngLat, SiteId};
use gpu::{ModelViewState, RecordingContext};
use layers::{DRAFT_LAYER, HeadlessEngine, MapEngine, SITES_SOURCE, SourceSpec};
use pretty_assertions::assert_eq;
use scene::{
    Corner, FilterPredicate, ModelAnchor, OverlayAsset, OverlayBounds, Site, SiteStatus,
};
use serde_json::json;
use streaming::{MemoryFetcher, load_model};
use viewer::{PanelMapOrchestrator, ViewerConfig};

type Orchestrator = PanelMapOrchestrator<HeadlessEngine, RecordingContext>;

const TRIANGLE: &str = r#"{
    "asset": { "version": "2.0" },
    "nodes": [ { "mesh": 0 } ],
    "meshes": [ { "primitives": [ { "attributes": { "POSITION": 0 } } ] } ],
    "accessors": [ { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" } ],
    "bufferViews": [ { "buffer": 0, "byteLength": 36 } ],
    "buffers": [ { "byteLength": 36,
        "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA" } ]
}"#;

const MODEL_A: &str = "https://cdn.test/a.gltf";
const MODEL_B: &str = "https://cdn.test/b.gltf";

fn p(lng: f64, lat: f64) -> LngLat {
    LngLat::new(lng, lat).unwrap()
}

fn bounds(dx: f64) -> OverlayBounds {
    OverlayBounds {
        top_left: p(100.0 + dx, 14.0),
        top_right: p(100.1 + dx, 14.0),
        bottom_right: p(100.1 + dx, 13.9),
        bottom_left: p(100.0 + dx, 13.9),
    }
}

fn anchor(asset: &str, yaw: f64) -> ModelAnchor {
    ModelAnchor::new(asset, p(100.5, 13.75), 0.0, yaw, 1.0).unwrap()
}

fn ready(snapshot: Snapshot) -> Orchestrator {
    let mut o = PanelMapOrchestrator::new(
        HeadlessEngine::new(),
        RecordingContext::new(),
        ViewerConfig::default(),
    );
    o.replace_snapshot(snapshot).unwrap();
    o.engine_mut().set_ready();
    o.on_map_ready();
    o
}

fn source_ids(engine: &HeadlessEngine) -> Vec<String> {
    let Some(SourceSpec::GeoJson { data, .. }) = engine.source(SITES_SOURCE) else {
        panic!("site source missing");
    };
    data["features"]
        .as_array()
        .expect("features array")
        .iter()
        .map(|f| f["properties"]["id"].as_str().unwrap().to_string())
        .collect()
}

fn many_sites() -> Vec<Site> {
    (0..500)
        .map(|i| {
            let status = if i % 50 == 0 {
                None
            } else if i % 25 == 24 {
                Some(SiteStatus::Hidden)
            } else {
                Some(SiteStatus::Active)
            };
            Site::new(
                format!("s{i}"),
                format!("Site {i}"),
                p(97.0 + (i % 60) as f64 * 0.1, 6.0 + (i / 60) as f64 * 1.5),
                format!("cat-{}", i % 10),
                format!("prov-{}", i % 77),
                2000 + (i % 20) as i32,
            )
            .with_status(status)
        })
        .collect()
}

fn model_sites() -> Snapshot {
    Snapshot {
        sites: vec![
            Site::new("a", "Alpha", p(100.5, 13.75), "wind", "Bangkok", 2020)
                .with_overlay(OverlayAsset::new("plans/a.png", bounds(0.0)))
                .with_model(anchor(MODEL_A, 370.0)),
            Site::new("b", "Bravo", p(100.6, 13.8), "solar", "Bangkok", 2021)
                .with_overlay(OverlayAsset::new("plans/b.png", bounds(0.5)))
                .with_model(anchor(MODEL_B, 0.0)),
            Site::new("c", "Charlie", p(100.7, 13.9), "solar", "Chonburi", 2022),
        ],
        clients: vec![],
    }
}

fn fetcher() -> MemoryFetcher {
    MemoryFetcher::new()
        .with_asset(MODEL_A, TRIANGLE.as_bytes().to_vec())
        .with_asset(MODEL_B, TRIANGLE.as_bytes().to_vec())
        .with_chunk_size(64)
}

/// Runs the host side of a model load: download, parse, deliver.
fn run_load(o: &mut Orchestrator, fetcher: &MemoryFetcher, ticket: &gpu::LoadTicket) -> bool {
    let result = pollster::block_on(load_model(fetcher, &ticket.url, &mut |pct| {
        o.model_progress(ticket.token, pct);
    }));
    o.model_loaded(ticket.token, result)
}

#[test]
fn filters_over_many_sites() {
    let sites = many_sites();
    let active = sites.iter().filter(|s| s.is_active()).count();
    assert_eq!(active, 470);

    let mut o = ready(Snapshot {
        sites: sites.clone(),
        clients: vec![],
    });
    assert_eq!(o.facets().categories.len(), 10);
    assert_eq!(o.facets().provinces.len(), 77);
    let ids = source_ids(o.engine());
    assert_eq!(ids.len(), active);
    for s in sites.iter().filter(|s| !s.is_active()) {
        assert!(!ids.contains(&s.id.to_string()), "{} is not active", s.id);
    }

    let mut now = 0.0;
    for (province, category) in [("prov-3", "cat-3"), ("prov-10", "cat-4"), ("prov-76", "cat-6")] {
        o.set_filter(
            FilterPredicate::any()
                .with_province(province)
                .with_category(category),
            now,
        );
        now += 1000.0;
        o.tick(now);
        let expected: Vec<String> = sites
            .iter()
            .filter(|s| s.is_active() && s.province == province && s.category.as_str() == category)
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(source_ids(o.engine()), expected);
        for f in &o.features().features {
            assert_eq!(f.properties.province, province);
            assert_eq!(f.properties.category.as_str(), category);
        }
    }

    o.set_filter(FilterPredicate::any(), now);
    o.tick(now + 300.0);
    assert_eq!(source_ids(o.engine()).len(), active);
}

#[test]
fn overlay_toggle_and_opacity() {
    let mut o = ready(model_sites());

    o.select_site(Some(SiteId::new("c")));
    assert!(!o.set_overlay_visible(true));
    assert_eq!(o.engine().image_source_count(), 0);

    o.select_site(Some(SiteId::new("a")));
    assert_eq!(o.engine().image_source_count(), 0, "raster is fetched lazily");
    assert!(o.set_overlay_visible(true));
    let layer = o.engine().layer("overlay-layer-a").expect("raster layer");
    assert_eq!(layer.paint["raster-opacity"], json!(0.8));

    let source_writes = o.engine().source_writes();
    assert_eq!(o.set_overlay_opacity(0.4), Some(0.4));
    let layer = o.engine().layer("overlay-layer-a").unwrap();
    assert_eq!(layer.paint["raster-opacity"], json!(0.4));
    assert_eq!(o.engine().source_writes(), source_writes);
    assert_eq!(o.engine().image_source_count(), 1);

    assert!(!o.set_overlay_visible(false));
    assert!(o.engine().has_source("overlay-a"), "hidden, not destroyed");
    assert!(o.set_overlay_visible(true));
    assert_eq!(o.engine().source_writes(), source_writes);
}

#[test]
fn switching_sites_leaves_at_most_one_overlay() {
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));
    o.set_overlay_visible(true);

    o.select_site(Some(SiteId::new("b")));
    assert!(!o.engine().has_source("overlay-a"));
    assert!(o.engine().image_source_count() <= 1);
    o.set_overlay_visible(true);
    assert_eq!(o.engine().image_source_count(), 1);
    assert!(o.engine().has_source("overlay-b"));

    o.close_panel();
    assert_eq!(o.engine().image_source_count(), 0);
    assert_eq!(o.map().highlighted(), None);
}

#[test]
fn stale_model_load_is_not_applied() {
    let fetcher = fetcher();
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));
    let ticket_a = o.view_3d().expect("load for a");
    assert!(matches!(o.model_state(), ModelViewState::Loading { .. }));

    o.select_site(Some(SiteId::new("b")));
    assert_eq!(o.model_state(), ModelViewState::Inactive);

    assert!(!run_load(&mut o, &fetcher, &ticket_a));
    assert_eq!(o.model_state(), ModelViewState::Inactive);
    assert!(o.engine().custom_layers().is_empty());
    assert!(!o.render_frame(&Mat4::IDENTITY));
    assert!(o.gpu().draws().is_empty());

    let ticket_b = o.view_3d().expect("load for b");
    assert_eq!(ticket_b.url, MODEL_B);
    assert!(run_load(&mut o, &fetcher, &ticket_b));
    assert_eq!(o.model_state(), ModelViewState::Ready);
    assert!(o.render_frame(&Mat4::IDENTITY));
    assert_eq!(o.gpu().draws().len(), 1);
}

#[test]
fn configured_yaw_and_drag_compose_modulo_360() {
    let fetcher = fetcher();
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));
    let ticket = o.view_3d().unwrap();
    assert!(run_load(&mut o, &fetcher, &ticket));

    assert_eq!(o.model_renderer().effective_yaw_deg(), Some(10.0));
    assert!(o.model_pointer_down(100.0));
    assert!(!o.engine().gestures_enabled());
    o.model_pointer_move(60.0);
    assert_eq!(o.model_renderer().effective_yaw_deg(), Some(350.0));
    o.model_pointer_up();
    assert!(o.engine().gestures_enabled());

    o.reset_model_rotation();
    assert_eq!(o.model_renderer().effective_yaw_deg(), Some(10.0));
}

#[test]
fn failed_load_retries_to_ready() {
    let fetcher = fetcher();
    fetcher.fail_next(MODEL_A, 1);
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));
    let ticket = o.view_3d().unwrap();

    assert!(run_load(&mut o, &fetcher, &ticket));
    match o.model_state() {
        ModelViewState::Error { message, attempts } => {
            assert!(!message.is_empty());
            assert_eq!(attempts, 1);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(o.engine().gestures_enabled());
    assert!(!o.model_cache().contains(MODEL_A));

    let retry = o.retry_3d().expect("retry");
    assert!(matches!(o.model_state(), ModelViewState::Loading { .. }));
    assert!(run_load(&mut o, &fetcher, &retry));
    assert_eq!(o.model_state(), ModelViewState::Ready);
    assert_eq!(fetcher.requests().len(), 2);
    assert!(o.render_frame(&Mat4::IDENTITY));
}

#[test]
fn every_exit_path_restores_gestures_and_frees_gpu() {
    let fetcher = fetcher();
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));

    // Loading
    o.view_3d().unwrap();
    o.exit_3d();
    assert!(o.engine().gestures_enabled());
    assert_eq!(o.model_state(), ModelViewState::Inactive);

    // Ready, mid-drag, via panel close
    let ticket = o.view_3d().unwrap();
    run_load(&mut o, &fetcher, &ticket);
    o.render_frame(&Mat4::IDENTITY);
    assert!(o.gpu().live_buffers() > 0);
    o.model_pointer_down(10.0);
    o.close_panel();
    assert!(o.engine().gestures_enabled());
    assert_eq!(o.gpu().live_buffers(), 0);
    assert!(o.engine().custom_layers().is_empty());

    // Error, then cancel
    o.select_site(Some(SiteId::new("b")));
    fetcher.fail_next(MODEL_B, 1);
    let ticket = o.view_3d().unwrap();
    run_load(&mut o, &fetcher, &ticket);
    assert!(matches!(o.model_state(), ModelViewState::Error { .. }));
    o.exit_3d();
    assert!(o.engine().gestures_enabled());
    assert_eq!(o.model_state(), ModelViewState::Inactive);
}

#[test]
fn cached_model_skips_the_download() {
    let fetcher = fetcher();
    let mut o = ready(model_sites());
    o.select_site(Some(SiteId::new("a")));
    let ticket = o.view_3d().unwrap();
    run_load(&mut o, &fetcher, &ticket);
    o.exit_3d();

    assert!(o.view_3d().is_none());
    assert_eq!(o.model_state(), ModelViewState::Ready);
    assert_eq!(fetcher.requests().len(), 1);
}

#[test]
fn calibration_withholds_raster_until_complete() {
    let mut o = ready(model_sites());
    let c = SiteId::new("c");
    o.select_site(Some(c.clone()));
    o.begin_calibration(&c, Some("plans/c.png")).unwrap();

    o.calibration_click(p(100.0, 14.0));
    o.calibration_click(p(100.2, 14.0));
    assert!(o.calibration_click(p(100.2, 13.8)).is_none());
    assert!(o.engine().layer(DRAFT_LAYER).is_none());
    assert_eq!(o.engine().markers().len(), 3);

    let done = o.calibration_click(p(100.0, 13.8)).expect("complete");
    assert!(o.engine().layer(DRAFT_LAYER).is_some());

    let moved = o
        .calibration_drag(Corner::TopRight, p(100.3, 14.1))
        .expect("still complete");
    assert_eq!(moved.top_right, p(100.3, 14.1));
    assert_eq!(moved.top_left, done.top_left);
    assert_eq!(moved.bottom_right, done.bottom_right);
    assert_eq!(moved.bottom_left, done.bottom_left);

    o.calibration_reset();
    assert!(o.engine().layer(DRAFT_LAYER).is_none());
    assert!(o.engine().markers().is_empty());
    o.cancel_calibration();
    assert!(o.calibration().is_none());
}
