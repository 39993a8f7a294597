// Tests for the append-only transcript log

use voicewire::session::{TranscriptEntry, TranscriptLog};

#[test]
fn test_log_starts_empty() {
    let log = TranscriptLog::new();
    assert!(log.is_empty());
    assert_eq!(log.len(), 0);
    assert!(log.entries().is_empty());
}

#[test]
fn test_entries_keep_arrival_order() {
    let mut log = TranscriptLog::new();

    let fragments = ["hello", "world", "again", "and again"];
    for fragment in fragments {
        log.append(TranscriptEntry::new(fragment));
    }

    assert_eq!(log.len(), fragments.len());

    let texts: Vec<&str> = log.entries().iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, fragments, "entries must stay in arrival order");
}

#[test]
fn test_append_never_disturbs_existing_entries() {
    let mut log = TranscriptLog::new();

    log.append(TranscriptEntry::new("first"));
    let first_received_at = log.entries()[0].received_at;

    for i in 0..100 {
        log.append(TranscriptEntry::new(format!("entry-{}", i)));
    }

    assert_eq!(log.entries()[0].text, "first");
    assert_eq!(log.entries()[0].received_at, first_received_at);
    assert_eq!(log.len(), 101);
}

#[test]
fn test_entry_timestamps_are_monotonic_with_order() {
    let mut log = TranscriptLog::new();
    log.append(TranscriptEntry::new("a"));
    log.append(TranscriptEntry::new("b"));

    let entries = log.entries();
    assert!(entries[0].received_at <= entries[1].received_at);
}
