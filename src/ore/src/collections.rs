// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Collection utilities.

use std::fmt::Display;

/// Extension methods for collections.
pub trait CollectionExt<T>: Sized
where
    T: IntoIterator,
{
    /// Consumes the collection and returns its first element.
    ///
    /// This method panics if the collection does not have at least one element.
    fn into_first(self) -> T::Item;

    /// Consumes the collection and returns its only element.
    ///
    /// This method panics if the collection does not have exactly one element.
    fn into_element(self) -> T::Item {
        self.expect_element("into_element called on collection without exactly one element")
    }

    /// Consumes the collection and returns its only element.
    ///
    /// This method panics with the given error message if the collection does not have exactly one element.
    fn expect_element<Err: Display>(self, msg: Err) -> T::Item;

    /// Consumes the collection and returns its only element, or `None` if
    /// the collection is empty or holds more than one element.
    fn try_into_element(self) -> Option<T::Item>;
}

impl<T> CollectionExt<T> for T
where
    T: IntoIterator,
{
    fn into_first(self) -> T::Item {
        match self.into_iter().next() {
            Some(el) => el,
            None => panic!("into_first called on empty collection"),
        }
    }

    fn expect_element<Err: Display>(self, msg: Err) -> T::Item {
        match self.try_into_element() {
            Some(el) => el,
            None => panic!("{}", msg),
        }
    }

    fn try_into_element(self) -> Option<T::Item> {
        let mut iter = self.into_iter();
        match (iter.next(), iter.next()) {
            (Some(el), None) => Some(el),
            _ => None,
        }
    }
}

/// Extension methods for slices of indices.
pub trait IndexSliceExt {
    /// Reports whether the slice is `0, 1, ..., len - 1`.
    fn is_identity(&self) -> bool;
}

impl IndexSliceExt for [usize] {
    fn is_identity(&self) -> bool {
        self.iter().enumerate().all(|(i, c)| i == *c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[crate::test]
    fn test_try_into_element() {
        assert_eq!(vec![7].try_into_element(), Some(7));
        assert_eq!(Vec::<i32>::new().try_into_element(), None);
        assert_eq!(vec![1, 2].try_into_element(), None);
    }

    #[crate::test]
    #[should_panic(expected = "into_element called")]
    fn test_into_element_panics() {
        vec![1, 2].into_element();
    }

    #[crate::test]
    fn test_identity() {
        assert!([0, 1, 2][..].is_identity());
        assert!(!([0, 2][..].is_identity()));
        assert!(Vec::<usize>::new().is_identity());
    }
}
