//! 帧循环演示：UI 面板事件 + 节流的输入事件 + 按名发布
//!
//! 运行：`RUST_LOG=framebus=debug cargo run -p demo -- [config.toml]`
use framebus::{EngineConfig, EventEngine, EventKey, Handler, PublishMode, PublishOutcome};
use framebus_macros::event_key;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME: Duration = Duration::from_millis(16);

#[event_key]
enum UiEvent {
    PanelOpen,
    PanelClose,
    #[event_key(name = "start.click")]
    StartClick,
    PointerMoved,
}

#[derive(Default)]
struct Hud {
    open_panels: RefCell<Vec<String>>,
    pointer_updates: Cell<u32>,
}

impl Hud {
    fn on_open(&self, panel: &String) -> anyhow::Result<()> {
        self.open_panels.borrow_mut().push(panel.clone());
        Ok(())
    }

    fn on_close(&self, panel: &String) -> anyhow::Result<()> {
        let mut panels = self.open_panels.borrow_mut();
        let pos = panels
            .iter()
            .position(|p| p == panel)
            .ok_or_else(|| anyhow::anyhow!("panel {panel} is not open"))?;
        panels.remove(pos);
        Ok(())
    }

    fn on_pointer(&self, _: &(f32, f32)) -> anyhow::Result<()> {
        self.pointer_updates.set(self.pointer_updates.get() + 1);
        Ok(())
    }
}

fn default_config() -> anyhow::Result<EngineConfig> {
    Ok(EngineConfig::from_toml_str(
        r#"
        [frame_budget]
        max_processing_time_ms = 2.0
        max_consecutive_per_key = 3

        [throttles.PointerMoved]
        max_events_per_window = 5
        window_seconds = 0.5
        strategy = "drop_oldest"
        max_queued_for_key = 1
        "#,
    )?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => default_config()?,
    };

    // 系统时钟：节流窗口与每帧 2ms 预算都按真实墙钟计算
    let engine = Rc::new(EventEngine::<UiEvent>::from_config(&config)?);
    let hud = Rc::new(Hud::default());

    engine.subscribe(UiEvent::PanelOpen, Handler::method(&hud, Hud::on_open))?;
    engine.subscribe(UiEvent::PanelClose, Handler::method(&hud, Hud::on_close))?;
    engine.subscribe(UiEvent::PointerMoved, Handler::method(&hud, Hud::on_pointer))?;

    // 点击开始：关闭菜单面板，下一帧打开游戏面板
    let weak = Rc::downgrade(&engine);
    engine.subscribe(
        UiEvent::StartClick,
        Handler::<()>::tagged("start-game", move |_| {
            if let Some(engine) = weak.upgrade() {
                engine.publish_now(UiEvent::PanelClose, "menu".to_string());
                engine.publish(UiEvent::PanelOpen, "game".to_string(), PublishMode::Queued);
            }
            Ok(())
        }),
    )?;

    engine.publish_now(UiEvent::PanelOpen, "menu".to_string());

    let mut last = Instant::now();
    for frame in 0..60u32 {
        // 每帧 8 次指针移动，远超节流上限
        for step in 0..8 {
            let pos = (frame as f32, step as f32);
            engine.publish(UiEvent::PointerMoved, pos, PublishMode::Throttled);
        }
        if frame == 30 {
            let outcome = engine.publish_by_name(UiEvent::StartClick.name(), (), PublishMode::Queued);
            debug_assert_eq!(outcome, PublishOutcome::Deferred);
        }

        thread::sleep(FRAME);
        let delta = last.elapsed().as_secs_f32();
        last = Instant::now();
        let report = engine.tick(delta, delta);
        if report.trimmed > 0 || report.failed > 0 || report.budget_exhausted {
            info!(
                frame = report.frame,
                processed = report.processed,
                trimmed = report.trimmed,
                failed = report.failed,
                budget_exhausted = report.budget_exhausted,
                "frame"
            );
        }
    }

    info!(
        panels = ?hud.open_panels.borrow(),
        pointer_updates = hud.pointer_updates.get(),
        "demo finished"
    );
    engine.shutdown();
    Ok(())
}
