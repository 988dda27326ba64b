/// Declare a settings-file parser over `&str` input.
///
/// `p! { name() -> Output, { body } }` declares a plain parser;
/// `p! { name(inner), { body } }` declares one wrapping another parser `inner`
/// and producing that parser's output.
macro_rules! p {
    ($name:ident() -> $ret:ty, $code:expr) => {
        combine::parser! {
            pub fn $name['a, I]()(I) -> $ret
            where [
                I: combine::stream::RangeStream<Range = &'a str, Token = char>,
                I::Error: combine::ParseError<
                    char,
                    &'a str,
                    <I as combine::stream::StreamOnce>::Position,
                >,
            ]
            {
                $code
            }
        }
    };
    ($name:ident($inner:ident), $code:expr) => {
        combine::parser! {
            pub fn $name['a, I, P]($inner: P)(I) -> P::Output
            where [
                I: combine::stream::RangeStream<Range = &'a str, Token = char>,
                I::Error: combine::ParseError<
                    char,
                    &'a str,
                    <I as combine::stream::StreamOnce>::Position,
                >,
                P: combine::Parser<I>,
            ]
            {
                $code
            }
        }
    };
}
