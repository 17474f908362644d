use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn from_lookup_defaults_when_empty() {
    let cfg = ChatConfig::from_lookup(lookup_from(&[]));
    assert_eq!(cfg, ChatConfig::default());
    assert_eq!(cfg.thread_poll_interval, Duration::from_secs(5));
    assert_eq!(cfg.global_poll_interval, Duration::from_secs(15));
    assert_eq!(cfg.badge_cap, 9);
}

#[test]
fn from_lookup_parses_overrides() {
    let cfg = ChatConfig::from_lookup(lookup_from(&[
        ("CHAT_BASE_URL", "https://portal.example.test/"),
        ("CHAT_THREAD_POLL_MS", "2500"),
        ("CHAT_GLOBAL_POLL_MS", "60000"),
        ("CHAT_REQUEST_TIMEOUT_SECS", "12"),
        ("CHAT_CONNECT_TIMEOUT_SECS", "3"),
        ("CHAT_BADGE_CAP", "99"),
    ]));
    assert_eq!(cfg.base_url, "https://portal.example.test");
    assert_eq!(cfg.thread_poll_interval, Duration::from_millis(2500));
    assert_eq!(cfg.global_poll_interval, Duration::from_secs(60));
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 12, connect_secs: 3 });
    assert_eq!(cfg.badge_cap, 99);
}

#[test]
fn from_lookup_rejects_zero_and_garbage_intervals() {
    let cfg = ChatConfig::from_lookup(lookup_from(&[
        ("CHAT_THREAD_POLL_MS", "0"),
        ("CHAT_GLOBAL_POLL_MS", "soon"),
        ("CHAT_BASE_URL", "   "),
    ]));
    assert_eq!(cfg.thread_poll_interval, Duration::from_millis(DEFAULT_THREAD_POLL_MS));
    assert_eq!(cfg.global_poll_interval, Duration::from_millis(DEFAULT_GLOBAL_POLL_MS));
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
}
