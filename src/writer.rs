// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Report sinks consuming the result tree.
//!
//! The event stream sink lives in [`event`](crate::event) as
//! [`JsonLinesListener`](crate::event::JsonLinesListener).

pub mod console;
pub mod ext;
pub mod json;

#[doc(inline)]
pub use self::{
    console::{Styles, Summary},
    ext::{Ext, Tee},
    json::JsonReport,
};
