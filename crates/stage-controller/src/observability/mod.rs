//! Observability for the stage controller.
//!
//! Metric labels are bounded by enums in code (roles, signal kinds, workflow
//! and step names), never by fan or connection ids.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `sc_lock_acquire_total` | Counter | `role`, `outcome` |
//! | `sc_heartbeat_total` | Counter | `role`, `status` |
//! | `sc_workflow_duration_seconds` | Histogram | `workflow` |
//! | `sc_workflow_step_failures_total` | Counter | `workflow`, `step` |
//! | `sc_promotions_total` | Counter | `kind` |
//! | `sc_private_call_transitions_total` | Counter | `transition` |
//! | `sc_screen_share_transitions_total` | Counter | `transition` |
//! | `sc_signals_sent_total` | Counter | `signal`, `status` |
//! | `sc_chat_messages_total` | Counter | `direction` |
//! | `sc_active_fans` | Gauge | none |
//! | `sc_actor_mailbox_depth` | Gauge | `actor_type` |

pub mod metrics;

pub use metrics::init_metrics_recorder;
