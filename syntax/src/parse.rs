use anyhow::Result;

#[derive(Debug, thiserror::Error)]
#[error("Parse error on line {line_no} ('{line}'): {msg}")]
pub struct Error {
    msg: String,
    /// 1-based
    line_no: usize,
    line: String,
}

/// Parse the full text of a settings file into its sections.
pub fn parse(text: &str) -> Result<Vec<crate::ast::Section<'_>>> {
    use combine::EasyParser;
    settings::file()
        .easy_parse(text)
        .map(|(sections, _remainder)| sections)
        .map_err(|e| {
            let pos = e.position.translate_position(text);
            // isolate the line in question:
            let before = &text[0..pos];
            let after = &text[pos..text.len()];
            let prefix: String = before.chars().rev().take_while(|&c| c != '\n').collect();
            let prefix: String = prefix.chars().rev().collect();
            let suffix: String = after.chars().take_while(|&c| c != '\n').collect();
            let line = prefix + &suffix;
            // combine's errors borrow the input, so we stringify before returning.
            Error {
                line_no: before.matches('\n').count() + 1,
                line,
                msg: format!("{}", e),
            }
            .into()
        })
}

pub mod prelude {
    pub use combine::parser::char::{char, string};
    pub use combine::parser::range::recognize;
    pub use combine::*;
}

pub mod util {

    use super::prelude::*;
    use combine::parser::char::space;

    // ';' and '#' both start comments, as in python's configparser.
    p! {
        comment() -> (), {
            one_of("#;".chars())
                .with(skip_many(none_of("\n".chars())))
                .map(|_| ())
        }
    }

    p! {
        whitespace() -> (), {
            skip_many1(space().map(|_| ()).or(comment()))
        }
    }

    // parser, followed by any amount of whitespace (including newlines and comments).
    p! {
        lex(parser), {
            parser.skip(optional(whitespace()))
        }
    }

    p! {
        brackets(parser), {
            char('[').with(parser).skip(char(']'))
        }
    }

    p! {
        rest_of_line() -> &'a str, {
            recognize(skip_many(none_of("\n".chars()))).map(|s: &'a str| s.trim())
        }
    }

    #[cfg(test)]
    mod test {
        use anyhow::Result;
        use combine::parser::char::char;
        use combine::EasyParser;
        #[test]
        fn test_whitespace() -> Result<()> {
            assert_eq!(
                ((), "key = val"),
                super::whitespace().easy_parse(" # comment\n ; other\n\tkey = val").unwrap()
            );
            assert!(super::whitespace().easy_parse("x").is_err());
            Ok(())
        }
        #[test]
        fn test_lex() -> Result<()> {
            assert_eq!(
                ('x', "y"),
                super::lex(char('x')).easy_parse("x \n # c\n y").unwrap()
            );
            Ok(())
        }
        #[test]
        fn test_rest_of_line() -> Result<()> {
            assert_eq!(
                ("a value  with spaces", "\nnext"),
                super::rest_of_line().easy_parse("  a value  with spaces \nnext").unwrap()
            );
            assert_eq!("", super::rest_of_line().easy_parse("").unwrap().0);
            Ok(())
        }
    }
}

mod entry {

    use super::prelude::*;
    use super::util::rest_of_line;
    use crate::ast::Entry;

    const FORBID_IN_KEY: &str = "=:\n[#;";

    p! {
        key() -> &'a str, {
            recognize(skip_many1(none_of(FORBID_IN_KEY.chars()))).map(|s: &'a str| s.trim())
        }
    }

    p! {
        separator() -> char, {
            char('=').or(char(':'))
        }
    }

    p! {
        entry() -> Entry<'a>, {
            key().skip(separator()).and(rest_of_line())
        }
    }

    #[cfg(test)]
    mod test {
        use anyhow::Result;
        use combine::EasyParser;
        #[test]
        fn test_entry() -> Result<()> {
            assert_eq!(
                ("sink_dir", "derivatives"),
                super::entry().easy_parse("sink_dir = derivatives").unwrap().0
            );
            assert_eq!(
                ("bet_frac", "0.5"),
                super::entry().easy_parse("bet_frac:0.5\n").unwrap().0
            );
            assert_eq!(
                ("empty", ""),
                super::entry().easy_parse("empty =").unwrap().0
            );
            assert_eq!(
                ("url", "http://host/a=b"),
                super::entry().easy_parse("url = http://host/a=b").unwrap().0
            );
            assert!(super::entry().easy_parse("no separator\n").is_err());
            Ok(())
        }
    }
}

mod settings {

    use super::entry::entry;
    use super::prelude::*;
    use super::util::{brackets, lex, whitespace};
    use crate::ast::Section;

    p! {
        header() -> &'a str, {
            brackets(recognize(skip_many1(none_of("]\n".chars())))).map(|s: &'a str| s.trim())
        }
    }

    p! {
        section() -> Section<'a>, {
            lex(header())
                .and(many(lex(entry())))
                .map(|(name, entries)| Section { name, entries })
        }
    }

    p! {
        file() -> Vec<Section<'a>>, {
            optional(whitespace()).with(many(section())).skip(eof())
        }
    }

}

#[cfg(test)]
mod test {
    #[test]
    fn test_parse_error_reports_line() {
        let err = super::parse("[A]\nk = v\n[B\nx = y\n").unwrap_err();
        assert!(err.to_string().starts_with("Parse error on line 3 ('[B')"), "{err}");
    }
}
