//! Tray surface
//!
//! The controller never touches the native tray directly. It writes the
//! desired icon, tooltip and menu into a shared [`TrayFrame`] through
//! [`TrayHandle`]; every write is a single field swap under one mutex. The
//! native tray thread periodically takes whatever changed and applies it.
//!
//! Menu rebuilds are expensive for the native toolkit, so at most one rebuild
//! happens per debounce window. A menu written inside the window stays
//! pending and the newest one is applied once the window has passed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::icon::IconColor;
use super::menu::MenuModel;

/// Sink for everything the controller shows in the tray
pub trait TrayView: Send {
    fn set_icon(&self, color: IconColor);
    fn set_tooltip(&self, text: &str);
    fn set_menu(&self, menu: MenuModel);
}

/// Changes to push to the native tray
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameUpdate {
    pub icon: Option<IconColor>,
    pub tooltip: Option<String>,
    pub menu: Option<MenuModel>,
}

impl FrameUpdate {
    pub fn is_empty(&self) -> bool {
        self.icon.is_none() && self.tooltip.is_none() && self.menu.is_none()
    }
}

/// Desired tray presentation plus bookkeeping of what was already applied
#[derive(Debug, Default)]
pub struct TrayFrame {
    icon: Option<IconColor>,
    icon_dirty: bool,
    tooltip: String,
    tooltip_dirty: bool,
    pending_menu: Option<MenuModel>,
    last_menu_rebuild: Option<Instant>,
}

impl TrayFrame {
    pub fn set_icon(&mut self, color: IconColor) {
        if self.icon != Some(color) {
            self.icon = Some(color);
            self.icon_dirty = true;
        }
    }

    pub fn set_tooltip(&mut self, text: &str) {
        if self.tooltip != text {
            self.tooltip = text.to_string();
            self.tooltip_dirty = true;
        }
    }

    pub fn set_menu(&mut self, menu: MenuModel) {
        self.pending_menu = Some(menu);
    }

    pub fn icon(&self) -> Option<IconColor> {
        self.icon
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    /// Take the changes that are due at `now`
    pub fn take_update(&mut self, now: Instant, debounce: Duration) -> FrameUpdate {
        let mut update = FrameUpdate::default();

        if self.icon_dirty {
            self.icon_dirty = false;
            update.icon = self.icon;
        }
        if self.tooltip_dirty {
            self.tooltip_dirty = false;
            update.tooltip = Some(self.tooltip.clone());
        }

        let menu_due = match self.last_menu_rebuild {
            Some(last) => now.saturating_duration_since(last) >= debounce,
            None => true,
        };
        if menu_due {
            if let Some(menu) = self.pending_menu.take() {
                self.last_menu_rebuild = Some(now);
                update.menu = Some(menu);
            }
        }

        update
    }
}

/// Cloneable handle to the shared frame
#[derive(Debug, Clone, Default)]
pub struct TrayHandle {
    frame: Arc<Mutex<TrayFrame>>,
}

impl TrayHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame(&self) -> MutexGuard<'_, TrayFrame> {
        // A panic while holding the lock leaves the frame in a usable state
        self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn take_update(&self, now: Instant, debounce: Duration) -> FrameUpdate {
        self.frame().take_update(now, debounce)
    }

    pub fn tooltip(&self) -> String {
        self.frame().tooltip().to_string()
    }

    pub fn icon(&self) -> Option<IconColor> {
        self.frame().icon()
    }
}

impl TrayView for TrayHandle {
    fn set_icon(&self, color: IconColor) {
        self.frame().set_icon(color);
    }

    fn set_tooltip(&self, text: &str) {
        self.frame().set_tooltip(text);
    }

    fn set_menu(&self, menu: MenuModel) {
        self.frame().set_menu(menu);
    }
}

#[cfg(windows)]
pub use native::spawn_tray_thread;

/// Native tray thread built on `tray-icon`
#[cfg(windows)]
mod native {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::{Duration, Instant};

    use crossbeam_channel::TryRecvError;
    use tokio::sync::mpsc::UnboundedSender;
    use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem, Submenu};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    };

    use super::{FrameUpdate, TrayHandle};
    use crate::ui::icon::{render_icon, IconColor};
    use crate::ui::menu::{MenuAction, MenuEntry, MenuItemSpec, MenuModel};
    use crate::error::TrayError;

    /// Pause between two passes of the UI loop
    const UI_FRAME: Duration = Duration::from_millis(15);

    const TRAY_TITLE: &str = "TrayBTB";

    struct NativeTray {
        tray: TrayIcon,
        menu: MenuModel,
    }

    impl NativeTray {
        fn create(initial: FrameUpdate) -> Result<Self, TrayError> {
            let menu = initial.menu.unwrap_or_else(|| MenuModel::build(&[], false));
            let tooltip = initial.tooltip.unwrap_or_else(|| TRAY_TITLE.to_string());
            let icon = to_icon(initial.icon.unwrap_or(IconColor::UPDATING))?;

            let tray = TrayIconBuilder::new()
                .with_menu(Box::new(build_menu(&menu)?))
                .with_tooltip(tooltip)
                .with_icon(icon)
                .build()
                .map_err(|e| TrayError::Creation(e.to_string()))?;

            Ok(Self { tray, menu })
        }

        fn apply(&mut self, update: FrameUpdate) -> Result<(), TrayError> {
            if let Some(color) = update.icon {
                self.tray
                    .set_icon(Some(to_icon(color)?))
                    .map_err(|e| TrayError::SetIcon(e.to_string()))?;
            }
            if let Some(tooltip) = update.tooltip {
                self.tray
                    .set_tooltip(Some(tooltip))
                    .map_err(|e| TrayError::SetTooltip(e.to_string()))?;
            }
            if let Some(menu) = update.menu {
                self.tray.set_menu(Some(Box::new(build_menu(&menu)?)));
                self.menu = menu;
            }
            Ok(())
        }

        fn action_for(&self, id: &MenuId) -> Option<MenuAction> {
            self.menu.action_for(&id.0).cloned()
        }
    }

    fn to_icon(color: IconColor) -> Result<Icon, TrayError> {
        let image = render_icon(color);
        let (width, height) = image.dimensions();
        Icon::from_rgba(image.into_raw(), width, height).map_err(|e| TrayError::SetIcon(e.to_string()))
    }

    fn to_item(spec: &MenuItemSpec) -> MenuItem {
        MenuItem::with_id(MenuId::new(&spec.id), &spec.label, spec.enabled, None)
    }

    fn build_menu(model: &MenuModel) -> Result<Menu, TrayError> {
        let menu = Menu::new();
        for entry in model.entries() {
            match entry {
                MenuEntry::Item(spec) => menu
                    .append(&to_item(spec))
                    .map_err(|e| TrayError::Menu(e.to_string()))?,
                MenuEntry::Submenu { label, items } => {
                    let submenu = Submenu::new(label, true);
                    for spec in items {
                        submenu
                            .append(&to_item(spec))
                            .map_err(|e| TrayError::Menu(e.to_string()))?;
                    }
                    menu.append(&submenu).map_err(|e| TrayError::Menu(e.to_string()))?;
                }
            }
        }
        Ok(menu)
    }

    fn pump_messages() {
        let mut msg = MSG::default();
        // SAFETY: msg outlives every call and is only used on this thread
        unsafe {
            while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    /// Start the tray thread and wait until the icon exists.
    ///
    /// The thread owns the native icon for its whole life and stops once
    /// `exit` is set or the controller side of `actions` is gone.
    pub fn spawn_tray_thread(
        handle: TrayHandle,
        debounce: Duration,
        actions: UnboundedSender<MenuAction>,
        exit: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>, TrayError> {
        let (ready_tx, ready_rx) = mpsc::channel();

        let join = thread::Builder::new()
            .name("tray-ui".to_string())
            .spawn(move || {
                let initial = handle.take_update(Instant::now(), Duration::ZERO);
                let mut tray = match NativeTray::create(initial) {
                    Ok(tray) => {
                        let _ = ready_tx.send(Ok(()));
                        tray
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                log::info!("Tray icon created");

                let menu_events = MenuEvent::receiver();
                while !exit.load(Ordering::SeqCst) {
                    pump_messages();

                    let update = handle.take_update(Instant::now(), debounce);
                    if !update.is_empty() {
                        if let Err(e) = tray.apply(update) {
                            log::warn!("Failed to update tray: {}", e);
                        }
                    }

                    loop {
                        match menu_events.try_recv() {
                            Ok(event) => {
                                let Some(action) = tray.action_for(&event.id) else {
                                    log::debug!("Ignoring click on unbound menu item {:?}", event.id);
                                    continue;
                                };
                                if actions.send(action).is_err() {
                                    log::warn!("Controller is gone, stopping tray thread");
                                    return;
                                }
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => return,
                        }
                    }

                    thread::sleep(UI_FRAME);
                }
                log::info!("Tray UI loop stopped");
            })
            .map_err(|e| TrayError::Creation(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(join),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => Err(TrayError::ThreadStopped),
        }
    }
}
