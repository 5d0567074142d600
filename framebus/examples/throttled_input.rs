//! 节流输入：鼠标移动每秒最多立即处理 2 次，溢出时只保留最新的一条。
//!
//! 运行：`cargo run -p framebus --example throttled_input`
use framebus::{
    EventEngine, FrameBudget, Handler, ManualClock, OverflowStrategy, PublishMode, ThrottleConfig,
};
use framebus_macros::event_key;
use std::time::Duration;

#[event_key]
enum InputEvent {
    MouseMoved,
}

#[derive(Clone, Copy, Debug)]
struct Cursor {
    x: i32,
    y: i32,
}

fn on_move(cursor: &Cursor) -> anyhow::Result<()> {
    println!("  cursor -> ({}, {})", cursor.x, cursor.y);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let clock = ManualClock::new();
    let engine = EventEngine::with_clock(FrameBudget::default(), clock.clone());

    engine.subscribe(InputEvent::MouseMoved, Handler::from_fn(on_move))?;
    engine.configure_throttle(
        InputEvent::MouseMoved,
        ThrottleConfig::builder()
            .max_events_per_window(2)
            .window_seconds(1.0)
            .strategy(OverflowStrategy::DropOldest)
            .max_queued_for_key(1)
            .build(),
    )?;

    for frame in 0..4 {
        println!("frame {frame}");
        for step in 0..3 {
            let cursor = Cursor {
                x: frame * 10 + step,
                y: step,
            };
            let outcome = engine.publish(InputEvent::MouseMoved, cursor, PublishMode::Throttled);
            println!("  publish {cursor:?}: {outcome:?}");
        }
        clock.advance(Duration::from_millis(400));
        let report = engine.tick(0.4, 0.4);
        println!(
            "  tick: processed={} trimmed={} remaining={}",
            report.processed, report.trimmed, report.remaining
        );
    }
    Ok(())
}
