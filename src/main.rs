// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::process;

use gauntlet::cli::{Opts, Parser as _};

fn main() {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_max_level(opts.log_level)
        .with_ansi(!opts.no_color)
        .with_writer(std::io::stderr)
        .init();
    if opts.no_color {
        console::set_colors_enabled(false);
    }

    let code = match opts.builder().parallel(opts.threads) {
        Ok(result) => result.exit_code(),
        Err(e) => {
            eprintln!("gauntlet: {e}");
            1
        }
    };
    process::exit(code);
}
