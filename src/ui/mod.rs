//! User interface: tray icon, menu and notifications

pub mod icon;
pub mod menu;
pub mod notifier;
pub mod tray;

pub use icon::{battery_color, render_icon, IconColor};
pub use menu::{MenuAction, MenuModel};
pub use notifier::{Notifier, ToastNotifier};
pub use tray::{TrayHandle, TrayView};
