// Copyright 2023-2026 lincoa developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Trust-region subproblem solvers

/// Moré-Sorensen method
pub mod moresorensen;

pub use self::moresorensen::{MoreSorensen, TrustRegionStep};
