//! Desktop notifications

use std::path::{Path, PathBuf};

use crate::config::UiConfig;

/// Title shown on every toast
pub const APP_TITLE: &str = "TrayBTB";

/// Shows a short message to the user
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Escape text for inclusion in toast XML
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Toast content document for a message
pub fn toast_xml(title: &str, message: &str, icon: Option<&Path>, sound: bool) -> String {
    let logo = icon
        .map(|path| {
            format!(
                "<image placement=\"appLogoOverride\" src=\"{}\"/>",
                escape_xml(&path.to_string_lossy())
            )
        })
        .unwrap_or_default();

    let audio = if sound {
        "<audio src=\"ms-winsoundevent:Notification.Reminder\" loop=\"false\"/>"
    } else {
        "<audio silent=\"true\"/>"
    };

    format!(
        "<toast><visual><binding template=\"ToastGeneric\"><text>{}</text><text>{}</text>{}</binding></visual>{}</toast>",
        escape_xml(title),
        escape_xml(message),
        logo,
        audio
    )
}

/// Windows toast notifications
pub struct ToastNotifier {
    app_id: String,
    icon_path: Option<PathBuf>,
    sound: bool,
}

impl ToastNotifier {
    pub fn new(config: &UiConfig) -> Self {
        Self {
            app_id: config.app_id.clone(),
            icon_path: config.icon_path.clone().filter(|path| path.exists()),
            sound: config.notification_sound,
        }
    }

    pub fn content(&self, message: &str) -> String {
        toast_xml(APP_TITLE, message, self.icon_path.as_deref(), self.sound)
    }

    #[cfg(windows)]
    fn show(&self, message: &str) -> windows::core::Result<()> {
        use windows::core::HSTRING;
        use windows::Data::Xml::Dom::XmlDocument;
        use windows::UI::Notifications::{ToastNotification, ToastNotificationManager};

        let document = XmlDocument::new()?;
        document.LoadXml(&HSTRING::from(self.content(message)))?;
        let toast = ToastNotification::CreateToastNotification(&document)?;
        ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(self.app_id.as_str()))?
            .Show(&toast)
    }
}

impl Notifier for ToastNotifier {
    fn notify(&self, message: &str) {
        log::info!("Notification: {}", message.replace('\n', " "));

        #[cfg(windows)]
        if let Err(e) = self.show(message) {
            log::warn!("Failed to show toast notification: {}", e);
        }
    }
}
