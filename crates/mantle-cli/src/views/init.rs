//! Output of `init`.

use mantle_common::diagnostics::Diagnostics;
use serde_json::json;

use super::json::JsonView;
use super::{Style, View};
use crate::arguments::ViewType;

/// Progress messages of `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitMessage {
    /// Configuring a backend of the given type.
    InitializingBackend(String),
    /// The backend was configured.
    BackendConfigured(String),
    /// Provider selection starts.
    InitializingProviders,
    /// A built-in provider was selected.
    ProviderSelected {
        /// Provider name.
        name: String,
        /// Provider version.
        version: String,
    },
    /// The dependency lock file was written.
    LockFileWritten(String),
    /// Initialization finished.
    Success,
}

impl InitMessage {
    const fn code(&self) -> &'static str {
        match self {
            Self::InitializingBackend(_) => "initializing_backend_message",
            Self::BackendConfigured(_) => "backend_configured_success",
            Self::InitializingProviders => "initializing_provider_plugin_message",
            Self::ProviderSelected { .. } => "provider_selected_message",
            Self::LockFileWritten(_) => "lock_info",
            Self::Success => "output_init_success_message",
        }
    }

    fn text(&self) -> String {
        match self {
            Self::InitializingBackend(kind) => format!("Initializing the backend ({kind})..."),
            Self::BackendConfigured(kind) => format!("Successfully configured the backend \"{kind}\"!"),
            Self::InitializingProviders => "Initializing provider plugins...".to_string(),
            Self::ProviderSelected { name, version } => format!("- Using built-in provider {name} v{version}"),
            Self::LockFileWritten(file) => format!(
                "Mantle has created a lock file {file} to record the provider\nselections it made above. Include this file in your version control repository\nso that Mantle can guarantee to make the same selections by default when\nyou run \"mantle init\" in the future."
            ),
            Self::Success => "Mantle has been successfully initialized!".to_string(),
        }
    }
}

/// What `init` shows.
pub trait InitView {
    /// Shows a progress message.
    fn message(&self, msg: &InitMessage);

    /// Shows diagnostics.
    fn diagnostics(&self, diags: Diagnostics);

    /// Suggests the command's help after an argument error.
    fn help_prompt(&self, command: &str);
}

/// Creates the view for the requested output format.
pub fn new_init_view(view_type: ViewType, view: &View) -> Box<dyn InitView> {
    match view_type {
        ViewType::Human => Box::new(HumanInit { view: view.clone() }),
        ViewType::Json => Box::new(JsonInit {
            json: JsonView::new(view.stdout().clone()),
        }),
    }
}

struct HumanInit {
    view: View,
}

impl InitView for HumanInit {
    fn message(&self, msg: &InitMessage) {
        let text = msg.text();
        let styled = match msg {
            InitMessage::Success | InitMessage::BackendConfigured(_) => self.view.colorize(&text, Style::Green),
            InitMessage::InitializingBackend(_) | InitMessage::InitializingProviders => {
                self.view.colorize(&text, Style::Bold)
            }
            _ => text,
        };
        let spaced = matches!(
            msg,
            InitMessage::InitializingBackend(_) | InitMessage::InitializingProviders | InitMessage::Success
        );
        if spaced {
            self.view.stdout().println("");
        }
        self.view.stdout().println(&styled);
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.view.diagnostics(diags);
    }

    fn help_prompt(&self, command: &str) {
        self.view.help_prompt(command);
    }
}

struct JsonInit {
    json: JsonView,
}

impl InitView for JsonInit {
    fn message(&self, msg: &InitMessage) {
        self.json
            .log("info", &msg.text(), "init_output", json!({ "message_code": msg.code() }));
    }

    fn diagnostics(&self, diags: Diagnostics) {
        self.json.diagnostics(&diags);
    }

    fn help_prompt(&self, _command: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arguments::ViewArgs;
    use crate::streams::Streams;

    #[test]
    fn json_messages_carry_codes() {
        let (streams, captured) = Streams::for_testing("");
        let view = View::new(streams, ViewArgs::default(), true, false);
        new_init_view(ViewType::Json, &view).message(&InitMessage::Success);
        let last: serde_json::Value =
            serde_json::from_str(captured.stdout().lines().last().expect("line")).expect("json");
        assert_eq!(last["type"], "init_output");
        assert_eq!(last["message_code"], "output_init_success_message");
    }

    #[test]
    fn human_success() {
        let (streams, captured) = Streams::for_testing("");
        let view = View::new(streams, ViewArgs::default(), true, false);
        new_init_view(ViewType::Human, &view).message(&InitMessage::Success);
        assert_eq!(captured.stdout(), "\nMantle has been successfully initialized!\n");
    }
}
