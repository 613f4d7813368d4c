#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::doc_markdown,
    clippy::float_cmp,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

//! Notification templating and automation engine for a repair-shop ERP.
//!
//! The host application feeds entity lifecycle events into
//! [`NotificationEngine::on_event`] and calls
//! [`NotificationEngine::tick`] on a timer; the engine resolves message
//! templates from the operator-editable settings document and fans the
//! rendered messages out over WhatsApp (API or Web deep link) and email.

pub mod channels;
pub mod engine;
pub mod events;
pub mod notifier;
pub mod reminder;
pub mod settings;
pub mod store;
pub mod template;

pub use channels::{ChannelError, ChannelKind, ChannelSet, DispatchOutcome, Recipients};
pub use engine::{EngineOptions, NotificationEngine};
pub use events::{EntityType, NotificationEvent, RepairStatus, Transition};
pub use reminder::{RuleKind, TickReport};
pub use settings::{ChannelId, MessagingSettings, SettingsError};
pub use template::{Resolved, TemplateSet};
