//! Lumina demo
//!
//! Opens one window on whichever backend the session offers and logs every
//! event. Escape or closing the window quits; Ctrl+C copies the title and
//! Ctrl+V logs the clipboard.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use lumina::{
    App, ControlFlowMode, Deadline, Event, KeyboardEvent, LogicalSize, Modifiers, PlatformApp,
    PlatformWindow, WindowAttributes, WindowEvent,
};
use xkbcommon::xkb::keysyms;

const HEARTBEAT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut app = App::from_env().context("no display server available")?;
    for monitor in app.monitors().context("listing monitors")? {
        info!(
            "Monitor {:?} {:?}: {}x{} at scale {}{}",
            monitor.id,
            monitor.name,
            monitor.size.width,
            monitor.size.height,
            monitor.scale_factor,
            if monitor.is_primary { " (primary)" } else { "" }
        );
    }

    let title = std::env::args().nth(1).unwrap_or_else(|| "Lumina".to_string());
    let window = app
        .create_window(&WindowAttributes::new(title, LogicalSize::new(640.0, 480.0)))
        .context("creating window")?;
    info!("Window capabilities: {:?}", window.capabilities());

    // Exercise the cross-thread path
    let sender = app.user_event_sender();
    thread::spawn(move || {
        let mut beats = 0u64;
        loop {
            thread::sleep(HEARTBEAT);
            beats += 1;
            if sender.send(beats).is_err() {
                break;
            }
        }
    });

    let mut deadline = Deadline::after(HEARTBEAT);
    while !app.should_quit() {
        let event = match app.pump_events(ControlFlowMode::WaitUntil(deadline))? {
            Some(event) => event,
            None => {
                info!("Idle for {:?}", HEARTBEAT);
                deadline = Deadline::after(HEARTBEAT);
                continue;
            }
        };

        match &event {
            Event::Window(WindowEvent::Closed(_)) => app.quit(),
            Event::Keyboard(KeyboardEvent::KeyDown(key)) => {
                let control = key.modifiers.contains(Modifiers::CONTROL);
                match key.keysym.0 {
                    keysyms::KEY_Escape => app.quit(),
                    keysyms::KEY_c if control => {
                        if let Err(err) = app.write_clipboard_text(&window.title()) {
                            warn!("Copy failed: {}", err);
                        }
                    }
                    keysyms::KEY_v if control => match app.read_clipboard_text() {
                        Ok(text) => info!("Clipboard: {:?}", text),
                        Err(err) => warn!("Paste failed: {}", err),
                    },
                    _ => {}
                }
            }
            Event::User(payload) => info!("User event {:?}", payload.downcast_ref::<u64>()),
            _ => {}
        }
        info!("{:?}", event);
    }

    window.close();
    info!("Bye");
    Ok(())
}
