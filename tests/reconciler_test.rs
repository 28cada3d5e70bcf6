mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use common::ScriptedHttp;
use reserva_engine::domain::{EngineSnapshot, QuotePhase};
use reserva_engine::ports::{ChangeSink, HttpClientPort};
use reserva_engine::reconciler::SelectionReconciler;

const BASE: &str = "https://api.test";

fn engine(http: &Arc<ScriptedHttp>) -> SelectionReconciler {
    SelectionReconciler::new("S1", http.clone() as Arc<dyn HttpClientPort>, BASE, None)
}

/// Standard happy-path routes for school S1 / course "general".
fn script_general(http: &ScriptedHttp) {
    http.route(
        "horarios/S1/general",
        json!({"data": [
            {"horario": "AM", "precioMinimo": 250},
            {"horario": "PM", "precioMinimo": 310}
        ]}),
    );
    http.route("semanas/S1/general", json!({"data": {"semanas": ["1", "2", "4", "12"]}}));
    http.route(
        "curso-mas-economico/S1/general",
        json!({"data": {
            "curso": "General English",
            "horario": "AM",
            "semanas": 1,
            "precioBase": 250.0,
            "ciudad": "Dublin",
            "escuela": "Dublin Central"
        }}),
    );
}

#[tokio::test]
async fn course_change_loads_catalogs_and_quick_quotes() {
    let http = ScriptedHttp::new();
    script_general(&http);
    let engine = engine(&http);

    let snapshot = engine.select_course("general").await;

    assert_eq!(snapshot.schedules.items.len(), 2);
    assert_eq!(snapshot.weeks.items.len(), 4);
    let QuotePhase::Quoted(reservation) = &snapshot.phase else {
        panic!("expected a quoted phase, got {:?}", snapshot.phase);
    };
    assert_eq!(reservation.base_price, 250.0);
    // The cheapest-quote schedule is adopted into the selection.
    assert_eq!(snapshot.selection.schedule.as_deref(), Some("AM"));
    assert_eq!(http.requests_matching("curso-mas-economico"), 1);
    assert_eq!(http.requests_matching("calculo-reserva"), 0);
}

#[tokio::test]
async fn catalog_reload_auto_corrects_and_requotes_once() {
    let http = ScriptedHttp::new();
    script_general(&http);
    http.route(
        "horario=AM",
        json!({"data": {"horario": "AM", "semanas": 4, "precioBase": 1100.0}}),
    );
    http.route(
        "horario=PM",
        json!({"data": {"horario": "PM", "semanas": 4, "precioBase": 1240.0}}),
    );
    let engine = engine(&http);

    engine.select_course("general").await;
    engine.select_weeks(4).await;
    let snapshot = engine.select_schedule("PM").await;
    assert_eq!(snapshot.selection.schedule.as_deref(), Some("PM"));

    // The backend drops PM from the catalog; the reload must fall back to
    // the first remaining schedule and requote exactly once with it.
    http.route(
        "horarios/S1/general",
        json!({"data": [{"horario": "AM"}, {"horario": "EVE"}]}),
    );
    http.route(
        "horario=AM",
        json!({"data": {"horario": "AM", "semanas": 4, "precioBase": 980.0}}),
    );
    http.clear_log();

    let snapshot = engine.reload_catalogs().await;

    assert_eq!(snapshot.selection.schedule.as_deref(), Some("AM"));
    let quotes: Vec<String> = http
        .requests()
        .into_iter()
        .filter(|u| u.contains("calculo-reserva"))
        .collect();
    assert_eq!(quotes.len(), 1);
    assert!(quotes[0].contains("horario=AM"));
    let QuotePhase::Quoted(reservation) = &snapshot.phase else {
        panic!("expected a quoted phase");
    };
    assert_eq!(reservation.base_price, 980.0);
}

#[tokio::test]
async fn full_quote_echoing_another_schedule_keeps_the_explicit_choice() {
    let http = ScriptedHttp::new();
    script_general(&http);
    http.route(
        "calculo-reserva",
        json!({"data": {"horario": "AM", "semanas": 4, "precioBase": 1100.0}}),
    );
    // Backend quirk: the full calculation answers with a different horario
    // than the one requested.
    http.route(
        "horario=PM",
        json!({"data": {"horario": "AM", "semanas": 4, "precioBase": 980.0}}),
    );
    let engine = engine(&http);

    engine.select_course("general").await;
    engine.select_weeks(4).await;
    let snapshot = engine.select_schedule("PM").await;

    // The user picked PM; the quote is applied but must not rewrite the
    // selection behind their back.
    assert_eq!(snapshot.selection.schedule.as_deref(), Some("PM"));
    let QuotePhase::Quoted(reservation) = &snapshot.phase else {
        panic!("expected a quoted phase");
    };
    assert_eq!(reservation.base_price, 980.0);
}

#[tokio::test]
async fn slow_superseded_quote_never_overwrites_fast_one() {
    let http = ScriptedHttp::new();
    script_general(&http);
    http.route(
        "calculo-reserva",
        json!({"horario": "AM", "semanas": 4, "precioBase": 999.0}),
    );
    http.route_with(
        "horario=SLOW",
        200,
        json!({"horario": "SLOW", "semanas": 4, "precioBase": 111.0}),
        Duration::from_millis(200),
    );
    http.route(
        "horario=FAST",
        json!({"horario": "FAST", "semanas": 4, "precioBase": 222.0}),
    );
    let engine = engine(&http);

    engine.select_course("general").await;
    engine.select_weeks(4).await;

    let (_slow, fast) = tokio::join!(engine.select_schedule("SLOW"), async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.select_schedule("FAST").await
    });

    let QuotePhase::Quoted(reservation) = &fast.phase else {
        panic!("expected the fast quote to win");
    };
    assert_eq!(reservation.base_price, 222.0);

    // Even after the slow response's latency has fully elapsed, the engine
    // still holds the fast result.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let settled = engine.snapshot();
    let QuotePhase::Quoted(reservation) = &settled.phase else {
        panic!("expected the fast quote to persist");
    };
    assert_eq!(reservation.base_price, 222.0);
    assert_eq!(settled.selection.schedule.as_deref(), Some("FAST"));
}

#[tokio::test]
async fn course_change_mid_fetch_discards_the_old_catalogs() {
    let http = ScriptedHttp::new();
    script_general(&http);
    // The old course's schedules are slow; the new course's are instant.
    http.route_with(
        "horarios/S1/general",
        200,
        json!({"data": [{"horario": "AM"}, {"horario": "PM"}]}),
        Duration::from_millis(200),
    );
    http.route("horarios/S1/work-and-study", json!({"data": [{"horario": "EVE"}]}));
    http.route("semanas/S1/work-and-study", json!({"data": {"semanas": ["4", "8"]}}));
    http.route(
        "curso-mas-economico/S1/work-and-study",
        json!({"horario": "EVE", "semanas": 4, "precioBase": 620.0}),
    );
    let engine = engine(&http);

    let (_old, _new) = tokio::join!(engine.select_course("general"), async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.select_course("work-and-study").await
    });

    tokio::time::sleep(Duration::from_millis(250)).await;
    let settled = engine.snapshot();
    assert_eq!(settled.selection.course_key.as_deref(), Some("work-and-study"));
    let codes: Vec<&str> = settled.schedules.items.iter().map(|o| o.code.as_str()).collect();
    assert_eq!(codes, vec!["EVE"]);
}

#[tokio::test]
async fn advisor_gate_clears_the_reservation() {
    let http = ScriptedHttp::new();
    script_general(&http);
    http.route(
        "curso-mas-economico/S1/general",
        json!({
            "requiresAdvisor": true,
            "canBookInstantly": false,
            "countryCode": "BR",
            "advisorContact": "asesores@example.com",
            "message": "Un asesor te contactará en 24h"
        }),
    );
    let engine = engine(&http);

    let snapshot = engine.select_course("general").await;

    let QuotePhase::AdvisorRequired(notice) = &snapshot.phase else {
        panic!("expected the advisor branch, got {:?}", snapshot.phase);
    };
    assert_eq!(notice.advisor_contact, "asesores@example.com");
    assert_eq!(notice.country_code, "BR");
    assert!(engine.reservation().is_none());
}

#[tokio::test]
async fn quote_failure_surfaces_the_server_message() {
    let http = ScriptedHttp::new();
    script_general(&http);
    http.route_with(
        "curso-mas-economico/S1/general",
        503,
        json!({"message": "school temporarily offline"}),
        Duration::ZERO,
    );
    let engine = engine(&http);

    let snapshot = engine.select_course("general").await;

    let QuotePhase::Failed(message) = &snapshot.phase else {
        panic!("expected a failed phase");
    };
    assert_eq!(message, "school temporarily offline");
    assert!(engine.reservation().is_none());
}

#[tokio::test]
async fn catalog_failure_keeps_last_good_options() {
    let http = ScriptedHttp::new();
    script_general(&http);
    let engine = engine(&http);

    engine.select_course("general").await;
    assert_eq!(engine.snapshot().schedules.items.len(), 2);

    http.route_with(
        "horarios/S1/general",
        500,
        json!({"message": "boom"}),
        Duration::ZERO,
    );
    let snapshot = engine.reload_catalogs().await;

    assert!(snapshot.schedules.error);
    assert_eq!(snapshot.schedules.items.len(), 2);
}

#[tokio::test]
async fn schedule_change_without_course_skips_the_network() {
    let http = ScriptedHttp::new();
    let engine = engine(&http);

    let snapshot = engine.select_schedule("AM").await;

    assert!(matches!(snapshot.phase, QuotePhase::Failed(_)));
    assert!(http.requests().is_empty());
}

struct RecordingSink {
    snapshots: Mutex<Vec<EngineSnapshot>>,
}

impl ChangeSink for RecordingSink {
    fn on_change(&self, snapshot: &EngineSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

#[tokio::test]
async fn change_sink_sees_loading_then_quoted() {
    let http = ScriptedHttp::new();
    script_general(&http);
    let sink = Arc::new(RecordingSink {
        snapshots: Mutex::new(Vec::new()),
    });
    let engine = SelectionReconciler::new(
        "S1",
        http.clone() as Arc<dyn HttpClientPort>,
        BASE,
        Some(sink.clone()),
    );

    engine.select_course("general").await;

    let snapshots = sink.snapshots.lock().unwrap();
    assert!(snapshots.iter().any(|s| s.phase.is_loading()));
    assert!(matches!(
        snapshots.last().map(|s| &s.phase),
        Some(QuotePhase::Quoted(_))
    ));
}
