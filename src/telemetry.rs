use prometheus::{register_int_counter_vec, IntCounterVec};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use lazy_static::lazy_static;

lazy_static! {
    pub static ref VOTES_CNTR: IntCounterVec = register_int_counter_vec!(
        "poll_votes_total",
        "Number of votes cast",
        &["question"]
    )
    .unwrap();
    pub static ref PAGE_VISITS_CNTR: IntCounterVec = register_int_counter_vec!(
        "page_visits_total",
        "Number of redirects through the page tracker",
        &["category"]
    )
    .unwrap();
    pub static ref CATEGORY_LIKES_CNTR: IntCounterVec = register_int_counter_vec!(
        "category_likes_total",
        "Number of likes given to categories",
        &["category"]
    )
    .unwrap();
    pub static ref LOGINS_CNTR: IntCounterVec = register_int_counter_vec!(
        "logins_total",
        "Login attempts by outcome",
        &["outcome"]
    )
    .unwrap();
}

pub fn init_tracing() {
    let mut fmt_layer = fmt::layer();
    if std::env::var("INCLUDE_SPAN_EVENTS").is_ok_and(|value| value.eq_ignore_ascii_case("true")) {
        fmt_layer = fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);
    }
    let filter_layer = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
