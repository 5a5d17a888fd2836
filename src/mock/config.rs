// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`MockConfig`] definition.

use crate::{
    expr::{Map, Value},
    Error,
};

/// Settings of a mock, written by the `configure` steps of feature
/// backgrounds and read-only once [sealed](MockConfig::seal).
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    cors: bool,
    response_headers: Map,
    after_scenario: Option<Value>,
    sealed: bool,
}

impl MockConfig {
    /// `configure` key enabling CORS.
    pub const CORS: &'static str = "cors";

    /// `configure` key of the headers added to every response.
    pub const RESPONSE_HEADERS: &'static str = "responseHeaders";

    /// `configure` key of the function called after every matched scenario.
    pub const AFTER_SCENARIO: &'static str = "afterScenario";

    /// Indicates whether CORS is enabled.
    #[must_use]
    pub const fn cors(&self) -> bool {
        self.cors
    }

    /// Headers added to every response.
    #[must_use]
    pub const fn response_headers(&self) -> &Map {
        &self.response_headers
    }

    /// Function called after every matched scenario.
    #[must_use]
    pub const fn after_scenario(&self) -> Option<&Value> {
        self.after_scenario.as_ref()
    }

    /// Indicates whether writes are rejected.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Rejects every further write.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    fn check(&self, key: &str) -> crate::Result<()> {
        if self.sealed {
            return Err(Error::ConfigSealed(key.to_owned()));
        }
        Ok(())
    }

    /// Enables or disables CORS.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigSealed`] once sealed.
    pub fn set_cors(&mut self, cors: bool) -> crate::Result<()> {
        self.check(Self::CORS)?;
        self.cors = cors;
        Ok(())
    }

    /// Replaces the headers added to every response.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigSealed`] once sealed.
    pub fn set_response_headers(&mut self, headers: Map) -> crate::Result<()> {
        self.check(Self::RESPONSE_HEADERS)?;
        self.response_headers = headers;
        Ok(())
    }

    /// Sets the function called after every matched scenario.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigSealed`] once sealed.
    pub fn set_after_scenario(&mut self, hook: Option<Value>) -> crate::Result<()> {
        self.check(Self::AFTER_SCENARIO)?;
        self.after_scenario = hook;
        Ok(())
    }

    /// Applies every mock setting among the `configured` ones, ignoring the
    /// others.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigSealed`] on the first mock setting once sealed.
    pub fn apply(&mut self, configured: &Map) -> crate::Result<()> {
        for (key, value) in configured {
            match key.as_str() {
                Self::CORS => self.set_cors(value.is_truthy())?,
                Self::RESPONSE_HEADERS => {
                    self.set_response_headers(value.as_object().cloned().unwrap_or_default())?;
                }
                Self::AFTER_SCENARIO => {
                    self.set_after_scenario((!value.is_null()).then(|| value.clone()))?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
