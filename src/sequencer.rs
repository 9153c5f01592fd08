use std::future::Future;

use crate::config::CountLogConfig;
use crate::environment::Environment;
use crate::error::{SequenceError, ValidationError};
use crate::event::{BeaconRequest, EventKind, Navigation, PageIdentifier, ParameterBundle};

/// A validated call, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub kind: EventKind,
    pub page: PageIdentifier,
    pub bundle: ParameterBundle,
}

/// Sends a click or impression beacon, then navigates if asked to.
///
/// Each call validates its options synchronously and hands back a future for
/// the rest of the sequence:
///
/// 1. issue the beacon (done once the request is started, the response is never read)
/// 2. navigate to `navigation.url`, in a new tab or by replacing the page
///
/// Step 2 only starts after step 1 has settled. Nothing is shared between
/// calls, and nothing is retried.
pub struct EventSequencer<E> {
    env: E,
    config: CountLogConfig,
}

impl<E: Environment> EventSequencer<E> {
    pub fn new(env: E) -> Self {
        Self::with_config(env, CountLogConfig::default())
    }

    pub fn with_config(env: E, config: CountLogConfig) -> Self {
        Self { env, config }
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn config(&self) -> &CountLogConfig {
        &self.config
    }

    /// Log a click. `options.log` must contain `label`.
    ///
    /// Returns `Err` without touching the environment when the options are invalid.
    /// The returned future does nothing until polled.
    pub fn click(
        &self,
        options: impl Into<Option<ParameterBundle>>,
    ) -> Result<impl Future<Output = Result<(), SequenceError>> + '_, ValidationError> {
        let invocation = self.prepare(EventKind::Click, options.into())?;
        Ok(self.exec(invocation))
    }

    /// Log an impression. Same contract as [`click`](Self::click), minus the `label` rule.
    pub fn impression(
        &self,
        options: impl Into<Option<ParameterBundle>>,
    ) -> Result<impl Future<Output = Result<(), SequenceError>> + '_, ValidationError> {
        let invocation = self.prepare(EventKind::Impression, options.into())?;
        Ok(self.exec(invocation))
    }

    /// Parse an options object from JSON text, then [`prepare`](Self::prepare) it.
    ///
    /// `null` counts as absent options.
    pub fn prepare_json(&self, kind: EventKind, json: &str) -> Result<Invocation, ValidationError> {
        let bundle = ParameterBundle::from_json(json)?;
        self.prepare(kind, Some(bundle))
    }

    /// Validate `options` and capture the page identifier as of now.
    pub fn prepare(
        &self,
        kind: EventKind,
        options: Option<ParameterBundle>,
    ) -> Result<Invocation, ValidationError> {
        let bundle = options.ok_or(ValidationError::MissingOptions)?;
        validate(kind, &bundle)?;
        Ok(Invocation {
            kind,
            page: PageIdentifier::from_path(&self.env.current_path()),
            bundle,
        })
    }

    /// Run the emit-then-navigate sequence for an already validated call.
    ///
    /// A failed dispatch does not stop navigation. The navigation error, if
    /// any, is returned first; otherwise the dispatch error is.
    pub async fn exec(&self, invocation: Invocation) -> Result<(), SequenceError> {
        let dispatched = self.count_log(&invocation).await;
        if let Err(err) = &dispatched {
            tracing::debug!(error = %err, page = %invocation.page, "beacon dispatch failed");
        }
        self.navigate(invocation.bundle.navigation.as_ref()).await?;
        dispatched
    }

    async fn count_log(&self, invocation: &Invocation) -> Result<(), SequenceError> {
        let params = match invocation.bundle.log.as_ref() {
            Some(params) if !params.is_empty() => params,
            _ => return Ok(()),
        };

        let request = BeaconRequest::new(
            &self.config.base_path,
            self.env.now_millis(),
            &invocation.page,
            invocation.kind,
            params,
        );
        self.env
            .send_beacon(request.url())
            .map_err(SequenceError::Dispatch)?;
        tracing::debug!(url = request.url(), "beacon issued");
        Ok(())
    }

    async fn navigate(&self, navigation: Option<&Navigation>) -> Result<(), SequenceError> {
        let Some(navigation) = navigation else {
            return Ok(());
        };
        let Some(url) = navigation.target() else {
            return Ok(());
        };

        let result = if navigation.new_tab {
            self.env.open_new_context(url)
        } else {
            self.env.replace_location(url)
        };
        result.map_err(SequenceError::Navigation)?;
        tracing::debug!(url, new_tab = navigation.new_tab, "navigated");
        Ok(())
    }
}

/// Check `bundle` against the rules for `kind`. Pure; no side effects.
pub fn validate(kind: EventKind, bundle: &ParameterBundle) -> Result<(), ValidationError> {
    let has_label = bundle
        .log
        .as_ref()
        .is_some_and(|log| log.contains_key("label"));
    if kind.requires_label() && !has_label {
        return Err(ValidationError::MissingLabel);
    }
    Ok(())
}
