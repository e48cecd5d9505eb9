use std::ops::{Deref, Index};

/// Read-only flat view over the data of a rank-1 input tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span<'a, T> {
    data: &'a [T],
}

impl<'a, T> Span<'a, T> {
    pub(crate) fn new(data: &'a [T]) -> Self {
        Span { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'a, T> {
        self.data.iter()
    }
}

impl<T: Copy> Span<'_, T> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }
}

impl<T> Deref for Span<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data
    }
}

impl<T> Index<usize> for Span<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<'a, T> IntoIterator for Span<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
