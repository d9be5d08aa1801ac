//! End-to-end flows through the real imaging engine and the in-memory
//! platform: submit, preview, reveal.

mod common;

use blurmark::bot::{self, Event, EventOutcome};
use blurmark::ingest::{IngestOutcome, ingest};
use blurmark::output;
use blurmark::reveal::{RevealOutcome, reveal};
use blurmark::types::UserId;
use common::*;
use tokio::sync::mpsc;

const RED: [u8; 4] = [200, 30, 30, 255];
const GREEN: [u8; 4] = [30, 200, 30, 255];
const BLUE: [u8; 4] = [30, 30, 200, 255];

fn three_images_and_a_broken_one() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("red.png", solid_png(240, 160, RED)),
        ("broken.png", b"not really a png".to_vec()),
        ("green.png", solid_png(240, 160, GREEN)),
        ("blue.png", solid_png(240, 160, BLUE)),
    ]
}

#[tokio::test]
async fn preview_then_reveal_stamps_every_image() {
    let (state, platform) = real_state();

    let outcome = ingest(&state, submission("m1", "alice", three_images_and_a_broken_one())).await;
    let IngestOutcome::Published {
        previews, skipped, ..
    } = outcome
    else {
        panic!("submission was not published");
    };
    assert_eq!(previews, 3);
    assert_eq!(skipped, vec!["broken.png".to_string()]);

    let published = platform.public_messages();
    assert_eq!(published.len(), 1);
    let (_, preview) = &published[0];
    assert_eq!(preview.content, output::preview_caption(3));
    let names: Vec<_> = preview.files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(names, ["blurred_red.png", "blurred_green.png", "blurred_blue.png"]);
    let trigger = preview.trigger.clone().expect("preview carries a trigger");
    assert_eq!(trigger.label, output::TRIGGER_LABEL);

    let result = reveal(&state, activation("a1", "42", &trigger.custom_id())).await;
    assert!(
        matches!(result, RevealOutcome::Delivered { delivered: 3, skipped: 0, .. }),
        "{result:?}"
    );

    let delivered = platform.private_messages_for(&UserId("42".into()));
    let reply = delivered.last().expect("requester got a private reply");
    assert!(reply.content.contains("42"));
    assert_eq!(reply.files.len(), 3);
    for (file, color) in reply.files.iter().zip([RED, GREEN, BLUE]) {
        // The label reads the requester's id and was drawn on the untouched original.
        let expected = state.engine.stamp(&solid_png(240, 160, color), "42").unwrap();
        assert_eq!(file.bytes, expected, "{} differs", file.filename);

        let stamped = decode_rgba(&file.bytes);
        assert_eq!(stamped.dimensions(), (240, 160));
        // Top-left corner is untouched, the bottom-right carries the label.
        assert_eq!(stamped.get_pixel(0, 0).0, color);
        let marked = (120..240)
            .flat_map(|x| (80..160).map(move |y| (x, y)))
            .filter(|&(x, y)| stamped.get_pixel(x, y).0 != color)
            .count();
        assert!(marked > 0, "no label found on {}", file.filename);
    }
}

#[tokio::test]
async fn two_requesters_get_their_own_stamps() {
    let (state, platform) = real_state();
    let files = vec![("red.png", solid_png(240, 160, RED))];
    ingest(&state, submission("m1", "alice", files)).await;
    let (_, preview) = platform.public_messages().remove(0);
    let custom_id = preview.trigger.expect("trigger").custom_id();

    reveal(&state, activation("a1", "111", &custom_id)).await;
    reveal(&state, activation("a2", "222", &custom_id)).await;

    let first = platform.private_messages_for(&UserId("111".into()));
    let second = platform.private_messages_for(&UserId("222".into()));
    let first = &first.last().expect("first reply").files[0].bytes;
    let second = &second.last().expect("second reply").files[0].bytes;
    assert_ne!(first, second);

    // A repeat press yields the same stamp again; originals are untouched.
    reveal(&state, activation("a3", "111", &custom_id)).await;
    let again = platform.private_messages_for(&UserId("111".into()));
    assert_eq!(&again.last().expect("repeat reply").files[0].bytes, first);
}

#[tokio::test]
async fn event_loop_runs_a_whole_conversation() {
    let (state, platform) = real_state();
    let (tx, rx) = mpsc::channel(8);
    let runner = tokio::spawn(bot::run(state.clone(), rx));

    let files = vec![("red.png", solid_png(120, 80, RED))];
    tx.send(Event::Submission(submission("m1", "alice", files)))
        .await
        .unwrap();

    // Wait for the preview before pressing its button.
    let custom_id = loop {
        if let Some((_, preview)) = platform.public_messages().into_iter().next() {
            break preview.trigger.expect("trigger").custom_id();
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    tx.send(Event::Activation(activation("a1", "42", &custom_id)))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(runner.await.unwrap(), 2);
    assert_eq!(platform.private_messages_for(&UserId("42".into())).len(), 1);
}

#[tokio::test]
async fn dispatch_reports_both_pipelines() {
    let (state, _platform) = real_state();
    let files = vec![("red.png", solid_png(64, 64, RED))];
    let outcome = bot::dispatch(state.clone(), Event::Submission(submission("m1", "u", files))).await;
    assert!(matches!(
        outcome,
        EventOutcome::Ingest {
            outcome: IngestOutcome::Published { .. },
            ..
        }
    ));

    let outcome = bot::dispatch(state, Event::Activation(activation("a1", "42", "reveal:nope"))).await;
    assert!(matches!(
        outcome,
        EventOutcome::Reveal {
            outcome: RevealOutcome::Failed(_),
            ..
        }
    ));
}
