mod common;

use common::Harness;
use ember_core::OpenOutcome;
use ember_types::NewRelay;

const AUTHOR: i64 = 1;
const READER: i64 = 2;

#[tokio::test]
async fn open_notifies_both_sides_and_pipes_until_expiry() {
    let h = Harness::new(0);
    let outcome = h.relays.open_dialog(AUTHOR, READER, "Quiet Fox", "Bold Owl").await.unwrap();
    assert!(outcome.success());
    assert!(matches!(outcome, OpenOutcome::Opened { requester_notified: true, .. }));
    assert_eq!(h.gateway.sends_to(AUTHOR).len(), 1);
    assert_eq!(h.gateway.sends_to(READER).len(), 1);

    h.clock.set(1799);
    assert!(h.relays.pipe(READER, "hi there").await.unwrap());
    let (msg, _) = h.gateway.sends_to(AUTHOR).pop().unwrap();
    assert_eq!(msg.text, "Bold Owl: hi there");
    // Threaded under the author's open notice.
    assert_eq!(msg.reply_to, Some(h.gateway.sends_to(AUTHOR)[0].1));

    h.clock.set(1800);
    assert!(!h.relays.pipe(READER, "too late").await.unwrap());
    assert!(!h.relays.pipe(AUTHOR, "too late").await.unwrap());
}

#[tokio::test]
async fn second_dialog_is_refused_while_busy() {
    let h = Harness::new(0);
    h.relays.open_dialog(AUTHOR, READER, "A", "B").await.unwrap();

    let again = h.relays.open_dialog(AUTHOR, 3, "A", "C").await.unwrap();
    assert_eq!(again, OpenOutcome::Busy { user_id: AUTHOR });
    let other_side = h.relays.open_dialog(4, READER, "D", "B").await.unwrap();
    assert_eq!(other_side, OpenOutcome::Busy { user_id: READER });

    assert_eq!(h.relays.open_dialog(5, 5, "E", "E").await.unwrap(), OpenOutcome::SelfContact);
}

#[tokio::test]
async fn author_notice_failure_still_opens_the_session() {
    let h = Harness::new(0);
    h.gateway.fail_chat(AUTHOR);

    let outcome = h.relays.open_dialog(AUTHOR, READER, "A", "B").await.unwrap();
    assert!(!outcome.success());
    assert!(matches!(
        outcome,
        OpenOutcome::Opened { author_notified: false, requester_notified: true, .. }
    ));
    assert!(h.db.active_relay_for(READER, 0).unwrap().is_some());

    // Forwarding failures are swallowed; the message still counts as routed.
    assert!(h.relays.pipe(READER, "anyone?").await.unwrap());
}

#[tokio::test]
async fn requester_notice_failure_keeps_the_session_but_reports_failure() {
    let h = Harness::new(0);
    h.gateway.fail_chat(READER);

    let outcome = h.relays.open_dialog(AUTHOR, READER, "A", "B").await.unwrap();
    assert!(!outcome.success());
    assert!(matches!(
        outcome,
        OpenOutcome::Opened { author_notified: true, requester_notified: false, .. }
    ));
    assert!(h.db.active_relay_for(AUTHOR, 0).unwrap().is_some());
    assert!(h.db.active_relay_for(READER, 0).unwrap().is_some());
}

#[tokio::test]
async fn reply_routes_through_the_older_relay() {
    let h = Harness::new(0);
    h.relays.open_dialog(AUTHOR, READER, "Quiet Fox", "Bold Owl").await.unwrap();
    let (_, older_notice) = h.gateway.sends_to(READER)[0].clone();

    // A newer session for the reader, written straight to the store.
    let newer = h
        .db
        .create_relay(&NewRelay {
            a_user_id: 3,
            b_user_id: READER,
            a_alias: "Misty Wren".into(),
            b_alias: "Bold Owl".into(),
            expires_at: 1800,
        })
        .unwrap();
    h.db.record_relay_message(newer, READER, 9000).unwrap();

    assert!(h.relays.handle_reply(READER, older_notice, "to the fox").await.unwrap());
    let (to_author, _) = h.gateway.sends_to(AUTHOR).pop().unwrap();
    assert_eq!(to_author.text, "Bold Owl: to the fox");
    assert!(h.gateway.sends_to(3).is_empty());

    // Without a reply the most recent relay wins.
    assert!(h.relays.pipe(READER, "to the wren").await.unwrap());
    assert_eq!(h.gateway.sends_to(3).len(), 1);

    assert!(!h.relays.handle_reply(READER, 424242, "nowhere").await.unwrap());
}

#[tokio::test]
async fn end_closes_and_notifies_the_peer() {
    let h = Harness::new(0);
    h.relays.open_dialog(AUTHOR, READER, "Quiet Fox", "Bold Owl").await.unwrap();

    h.clock.set(60);
    assert_eq!(h.relays.end_for(READER).await.unwrap().as_deref(), Some("Quiet Fox"));
    let (notice, _) = h.gateway.sends_to(AUTHOR).pop().unwrap();
    assert!(notice.text.contains("Bold Owl"));

    assert!(!h.relays.pipe(AUTHOR, "hello?").await.unwrap());
    assert_eq!(h.relays.end_for(READER).await.unwrap(), None);

    let report = h.scheduler.tick().await;
    assert_eq!(report.purged_relays, 1);
}
