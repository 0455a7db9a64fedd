//! Fuzz test for the backend output parser
//!
//! Feeds arbitrary line sequences through the cdrecord rule table and checks
//! that progress figures stay in range.

#![no_main]

use arbitrary::Arbitrary;
use burnish_core::{Backend, JobEvent, OutputParser, ParseOutput, ParserContext};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct ParserInput {
    wodim: bool,
    requested_speed: u32,
    overburn: bool,
    lines: Vec<String>,
}

fuzz_target!(|input: ParserInput| {
    let backend = if input.wodim {
        Backend::Wodim
    } else {
        Backend::Cdrecord
    };
    let mut parser = OutputParser::new(
        backend,
        ParserContext {
            binary_name: backend.program().to_string(),
            requested_speed: input.requested_speed,
            overburn: input.overburn,
        },
    );

    let mut latched = None;
    for line in &input.lines {
        for output in parser.parse_line(line) {
            match output {
                ParseOutput::Event(JobEvent::Percent(p))
                | ParseOutput::Event(JobEvent::SubPercent(p))
                | ParseOutput::Event(JobEvent::BufferFifo(p)) => {
                    assert!(p <= 100, "percentage out of range: {}", p);
                }
                _ => {}
            }
        }

        // A latched error never changes afterwards
        if let Some(code) = latched {
            assert_eq!(parser.error_code(), Some(code));
        }
        latched = parser.error_code();
    }
});
