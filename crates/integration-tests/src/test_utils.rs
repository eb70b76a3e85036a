// REVDB - Reversible Interpreter Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Test utilities for integration tests

use std::sync::{Arc, Mutex};

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test. Safe to call from every test.
    pub fn init_test_environment() {
        revdb_common::logging::ensure_test_logging(None);
    }
}

/// Logging and warning capture utilities for tests
pub mod logging {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// A captured log event.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CapturedEvent {
        /// Level of the event
        pub level: Level,
        /// Target (module path) of the event
        pub target: String,
        /// The event's message
        pub message: String,
    }

    /// A custom tracing layer that captures warnings and errors
    #[derive(Clone, Default)]
    pub struct ErrorCapture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl ErrorCapture {
        /// Create a new ErrorCapture instance
        pub fn new() -> Self {
            Self::default()
        }

        /// Every captured event
        pub fn events(&self) -> Vec<CapturedEvent> {
            self.events.lock().expect("capture lock").clone()
        }

        /// Messages of the captured warnings
        pub fn warnings(&self) -> Vec<String> {
            self.messages_at(Level::WARN)
        }

        /// Messages of the captured errors
        pub fn errors(&self) -> Vec<String> {
            self.messages_at(Level::ERROR)
        }

        /// Check if any errors were captured
        pub fn has_errors(&self) -> bool {
            !self.errors().is_empty()
        }

        /// Clear captured events
        pub fn clear(&self) {
            self.events.lock().expect("capture lock").clear();
        }

        fn messages_at(&self, level: Level) -> Vec<String> {
            self.events()
                .into_iter()
                .filter(|event| event.level == level)
                .map(|event| event.message)
                .collect()
        }
    }

    impl<S> tracing_subscriber::Layer<S> for ErrorCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let level = *event.metadata().level();
            if level > Level::WARN {
                return;
            }

            struct MessageVisitor {
                message: String,
            }

            impl tracing::field::Visit for MessageVisitor {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.message = format!("{value:?}");
                    }
                }

                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = value.to_string();
                    }
                }
            }

            let mut visitor = MessageVisitor { message: String::new() };
            event.record(&mut visitor);

            if !visitor.message.is_empty() {
                self.events.lock().expect("capture lock").push(CapturedEvent {
                    level,
                    target: event.metadata().target().to_string(),
                    message: visitor.message,
                });
            }
        }
    }

    /// Run `f` on this thread with warnings and errors captured.
    ///
    /// The capturing subscriber only applies for the duration of `f`, so tests
    /// running in parallel do not see each other's events.
    pub fn with_error_capture<R>(f: impl FnOnce() -> R) -> (R, ErrorCapture) {
        let error_capture = ErrorCapture::new();
        let filter = tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("revdb=debug".parse().expect("valid directive"))
            .add_directive("revdb_engine=debug".parse().expect("valid directive"))
            .add_directive("revdb_common=debug".parse().expect("valid directive"));
        let subscriber = tracing_subscriber::registry()
            .with(error_capture.clone())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(filter);

        let result = tracing::subscriber::with_default(subscriber, f);
        (result, error_capture)
    }
}

/// Session testing utilities
pub mod session {
    use revdb_common::RevdbConfig;
    use revdb_engine::{Session, StopReport, StopSubscription};

    use crate::{
        program::Program,
        replay_target::{ReplayTarget, RUNTIME_LIBRARY},
    };

    /// Configuration pointing at the runtime library the replay target knows.
    pub fn test_config() -> RevdbConfig {
        RevdbConfig::default().with_library_path(RUNTIME_LIBRARY)
    }

    /// An inactive session over `program`.
    pub fn session(program: Program) -> Session<ReplayTarget> {
        Session::new(ReplayTarget::new(program), test_config())
    }

    /// A session over `program` with source-level debugging enabled.
    pub fn active_session(program: Program) -> (Session<ReplayTarget>, StopSubscription) {
        activate(session(program))
    }

    /// A session over a configured target with source-level debugging enabled.
    pub fn active_session_with(target: ReplayTarget) -> (Session<ReplayTarget>, StopSubscription) {
        activate(Session::new(target, test_config()))
    }

    fn activate(mut session: Session<ReplayTarget>) -> (Session<ReplayTarget>, StopSubscription) {
        let subscription = session.activate().expect("activate the session");
        (session, subscription)
    }

    /// `(function, line)` of the innermost frame of a report.
    pub fn location(report: &StopReport) -> Option<(String, u64)> {
        report.location.as_ref().map(|frame| (frame.func_name.clone(), frame.line))
    }

    /// Current line according to the state structure.
    pub fn current_line(session: &Session<ReplayTarget>) -> u64 {
        session.state().expect("read the interpreter state").current_line
    }
}
