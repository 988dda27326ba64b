/// A `key = value` line.
pub type Entry<'a> = (&'a str, &'a str);

/// A `[name]` header followed by its entries, in file order.
#[derive(Debug, PartialEq, Eq)]
pub struct Section<'a> {
    pub name: &'a str,
    pub entries: Vec<Entry<'a>>,
}

#[cfg(test)]
impl<'a> Section<'a> {
    pub fn new(name: &'a str, entries: Vec<Entry<'a>>) -> Self {
        Self { name, entries }
    }
}
