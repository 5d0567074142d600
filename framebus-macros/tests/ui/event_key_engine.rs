use framebus::{EventEngine, Handler, PublishMode, PublishOutcome};
use framebus_macros::event_key;

#[event_key]
enum GameEvent {
    ScoreChanged,
}

fn main() {
    let engine = EventEngine::<GameEvent>::default();
    engine
        .subscribe(GameEvent::ScoreChanged, Handler::<u32>::tagged("score", |_| Ok(())))
        .unwrap();
    let outcome = engine.publish(GameEvent::ScoreChanged, 10u32, PublishMode::Immediate);
    assert!(matches!(outcome, PublishOutcome::Dispatched(_)));
}
