use crate::kernel::term::{Convention, Term};

/// The "process string representation" contract: a renderer is fed raw text
/// chunks interleaved with term-entry/exit events carrying the child-index
/// path of the sub-term being rendered. An external display can use the
/// events to map output spans back to sites without the core knowing
/// anything about the rendering technology.
pub trait RenderSink {
    fn enter_term(&mut self, path: &[usize]);
    fn text(&mut self, chunk: &str);
    fn exit_term(&mut self, path: &[usize]);
}

/// Streams the term through the sink.
pub fn process_string(term: &Term, sink: &mut dyn RenderSink) {
    let mut path = vec![];
    walk(term, &mut path, sink);
}

fn walk(term: &Term, path: &mut Vec<usize>, sink: &mut dyn RenderSink) {
    sink.enter_term(path);
    if let Some((pairs, otherwise)) = term.alternatives_parts() {
        for (i, (cond, result)) in pairs.iter().enumerate() {
            sink.text(if i == 0 { "if " } else { " else if " });
            path.push(2 * i);
            walk(cond, path, sink);
            path.pop();
            sink.text(" then ");
            path.push(2 * i + 1);
            walk(result, path, sink);
            path.pop();
        }
        sink.text(" else ");
        path.push(2 * pairs.len());
        walk(otherwise, path, sink);
        path.pop();
        sink.exit_term(path);
        return;
    }

    let args = term.args();
    if term.convention() == Convention::Infix && args.len() == 2 {
        path.push(0);
        walk(&args[0], path, sink);
        path.pop();
        sink.text(&format!(" {} ", term.name()));
        path.push(1);
        walk(&args[1], path, sink);
        path.pop();
    } else {
        sink.text(term.name());
        if !args.is_empty() {
            sink.text("(");
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    sink.text(", ");
                }
                path.push(i);
                walk(arg, path, sink);
                path.pop();
            }
            sink.text(")");
        }
    }
    sink.exit_term(path);
}

/// A sink that just accumulates the text, dropping the span events.
#[derive(Default)]
pub struct StringSink {
    out: String,
}

impl StringSink {
    pub fn new() -> StringSink {
        StringSink { out: String::new() }
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

impl RenderSink for StringSink {
    fn enter_term(&mut self, _path: &[usize]) {}

    fn text(&mut self, chunk: &str) {
        self.out.push_str(chunk);
    }

    fn exit_term(&mut self, _path: &[usize]) {}
}

pub fn render_string(term: &Term) -> String {
    let mut sink = StringSink::new();
    process_string(term, &mut sink);
    sink.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_rendering() {
        let t = Term::parse("f(a, g(b))");
        assert_eq!(render_string(&t), "f(a, g(b))");
    }

    #[test]
    fn test_infix_rendering() {
        let t = Term::infix("=", "Boolean", Term::parse("a"), Term::parse("b"));
        assert_eq!(render_string(&t), "a = b");
    }

    #[test]
    fn test_alternatives_rendering() {
        let t = Term::alternatives(
            vec![(Term::parse("c"), Term::parse("r"))],
            Term::parse("o"),
        );
        assert_eq!(render_string(&t), "if c then r else o");
    }

    #[test]
    fn test_span_events_track_paths() {
        struct SpanSink {
            events: Vec<(bool, Vec<usize>)>,
        }
        impl RenderSink for SpanSink {
            fn enter_term(&mut self, path: &[usize]) {
                self.events.push((true, path.to_vec()));
            }
            fn text(&mut self, _chunk: &str) {}
            fn exit_term(&mut self, path: &[usize]) {
                self.events.push((false, path.to_vec()));
            }
        }

        let t = Term::parse("f(a, g(b))");
        let mut sink = SpanSink { events: vec![] };
        process_string(&t, &mut sink);
        assert!(sink.events.contains(&(true, vec![1, 0])));
        // Every enter has a matching exit.
        let enters = sink.events.iter().filter(|(e, _)| *e).count();
        let exits = sink.events.iter().filter(|(e, _)| !*e).count();
        assert_eq!(enters, exits);
    }
}
