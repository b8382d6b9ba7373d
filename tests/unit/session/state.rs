use super::*;
use crate::encode::memory::RecordingSinkFactory;
use crate::encode::sink::{FrameMode, SinkFactory, SinkOpts};
use crate::foundation::core::{FrameEncoding, StreamFormat};
use std::path::PathBuf;

async fn open(factory: &RecordingSinkFactory) -> Box<dyn StreamSink> {
    factory
        .open(SinkOpts {
            format: StreamFormat::Mp4,
            encoding: FrameEncoding::Png,
            fps: 30.0,
            out_path: PathBuf::from("out/anim.mp4"),
            mode: FrameMode::Streaming,
            ffmpeg: PathBuf::from("ffmpeg"),
            crf: None,
            debug: false,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn generations_increase_across_installs() {
    let factory = RecordingSinkFactory::new();
    let mut state = SessionState::default();
    assert_eq!(state.generation(), None);

    let first = state.install(open(&factory).await, "a.mp4".into());
    let mut taken = state.take().unwrap();
    assert_eq!(taken.filename, "a.mp4");
    taken.sink.close();
    assert_eq!(state.generation(), None);

    let second = state.install(open(&factory).await, "b.mp4".into());
    assert!(second > first);
    assert!(state.active_mut(first).is_none());
    assert!(state.active_mut(second).is_some());
}

#[tokio::test]
async fn reset_if_ignores_other_generations() {
    let factory = RecordingSinkFactory::new();
    let mut state = SessionState::default();
    let generation = state.install(open(&factory).await, "a.mp4".into());

    assert!(!state.reset_if(generation + 1));
    assert_eq!(factory.open_count(), 1);

    assert!(state.reset_if(generation));
    assert_eq!(factory.open_count(), 0);
    assert_eq!(state.generation(), None);
    assert!(!state.reset());
}

#[tokio::test]
async fn view_follows_install_and_take() {
    let factory = RecordingSinkFactory::new();
    let mut state = SessionState::default();
    let view = state.view();
    let mut rx = view.subscribe();
    assert_eq!(*view.borrow(), None);

    let generation = state.install(open(&factory).await, "a.mp4".into());
    assert!(rx.has_changed().unwrap());
    {
        let seen = rx.borrow_and_update();
        assert!(OpenSink::accepts(&seen, generation));
        assert_eq!(seen.as_ref().map(|o| o.filename.as_str()), Some("a.mp4"));
    }

    view.send_modify(|open| {
        if let Some(open) = open {
            open.closing = true;
        }
    });
    assert!(!OpenSink::accepts(&view.borrow(), generation));
    assert!(state.active_mut(generation).is_some());

    state.reset();
    assert_eq!(*view.borrow(), None);
    assert!(!OpenSink::accepts(&view.borrow(), generation));
}
