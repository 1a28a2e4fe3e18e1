use std::collections::HashSet;

/// Single attribute of an entry: case-preserving name and raw values
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn first_str(&self) -> Option<&str> {
        self.values
            .first()
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// Values that are valid UTF-8, in insertion order
    pub fn strings(&self) -> Vec<String> {
        self.values
            .iter()
            .filter_map(|value| String::from_utf8(value.clone()).ok())
            .collect()
    }

    /// Multi-valued attributes compare as sets, order carries no meaning
    pub fn same_values(&self, other: &Attribute) -> bool {
        same_values(&self.values, &other.values)
    }
}

pub(crate) fn same_values(left: &[Vec<u8>], right: &[Vec<u8>]) -> bool {
    let left: HashSet<&[u8]> = left.iter().map(Vec::as_slice).collect();
    let right: HashSet<&[u8]> = right.iter().map(Vec::as_slice).collect();
    left == right
}

/// Schema-less property bag of a directory entry.
///
/// Names are matched case-insensitively. Attributes and their values keep the
/// order they were inserted in, while equality is set-equality per attribute;
/// an attribute holding no values is equal to an absent one.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    attrs: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|attr| attr.is(name))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attrs.iter_mut().find(|attr| attr.is(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Appends a value, creating the attribute if needed
    pub fn add<V: Into<Vec<u8>>>(&mut self, name: &str, value: V) {
        let value = value.into();
        match self.get_mut(name) {
            Some(attr) => attr.values.push(value),
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }

    /// Replaces all values of the attribute. An empty iterator keeps the
    /// attribute present without values, which marks it as explicitly cleared.
    pub fn set<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        let values = values.into_iter().map(Into::into).collect();
        match self.get_mut(name) {
            Some(attr) => attr.values = values,
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                values,
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attrs.iter().position(|attr| attr.is(name))?;
        Some(self.attrs.remove(index))
    }

    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::first_str)
    }

    /// `None` when the attribute is absent, its UTF-8 values otherwise
    pub fn strings(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(Attribute::strings)
    }

    /// Case-insensitive membership test of a textual value
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.get(name).is_some_and(|attr| {
            attr.values
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value.as_bytes()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.attrs.iter().map(|attr| attr.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn values_of(&self, name: &str) -> &[Vec<u8>] {
        self.get(name).map(|attr| attr.values.as_slice()).unwrap_or(&[])
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        let covers = |left: &AttributeSet, right: &AttributeSet| {
            left.attrs
                .iter()
                .all(|attr| same_values(&attr.values, right.values_of(&attr.name)))
        };
        covers(self, other) && covers(other, self)
    }
}

impl Eq for AttributeSet {}

impl IntoIterator for AttributeSet {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attrs.into_iter()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut set = AttributeSet::new();
        for attr in iter {
            match set.get_mut(&attr.name) {
                Some(existing) => existing.values.extend(attr.values),
                None => set.attrs.push(attr),
            }
        }
        set
    }
}

/// Entry as returned by the directory
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: AttributeSet,
}

impl From<ldap3::SearchEntry> for DirectoryEntry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        let mut attrs = AttributeSet::new();
        for (name, values) in entry.attrs {
            attrs.set(&name, values);
        }
        for (name, values) in entry.bin_attrs {
            for value in values {
                attrs.add(&name, value);
            }
        }

        Self { dn: entry.dn, attrs }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOperation {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub operation: ModOperation,
    pub attribute: String,
    pub values: Vec<Vec<u8>>,
}

impl Modification {
    pub fn new(operation: ModOperation, attribute: &str, values: Vec<Vec<u8>>) -> Self {
        Self {
            operation,
            attribute: attribute.to_string(),
            values,
        }
    }
}

/// Ordered modify request. Order is significant: a `Delete` clearing an
/// attribute has to reach the server before the `Add` repopulating it.
pub type ModificationList = Vec<Modification>;

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> DirectoryEntry {
        let mut set = AttributeSet::new();
        for (name, values) in attrs {
            set.set(name, values.iter().copied());
        }
        DirectoryEntry {
            dn: dn.to_string(),
            attrs: set,
        }
    }
}
