//! The four concrete node layouts.

use super::{ExpLinks, Header, Node};

/// Key, value and header only.
#[derive(Debug)]
pub struct BaseNode<K, V> {
    header: Header,
    key: K,
    value: V,
}

impl<K, V> BaseNode<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            header: Header::new(),
            key,
            value,
        }
    }
}

impl<K: Send + Sync, V: Send + Sync> Node<K, V> for BaseNode<K, V> {
    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    fn header(&self) -> &Header {
        &self.header
    }
}

/// Base layout plus a per-entry cost.
#[derive(Debug)]
pub struct CostNode<K, V> {
    header: Header,
    cost: u32,
    key: K,
    value: V,
}

impl<K, V> CostNode<K, V> {
    pub fn new(key: K, value: V, cost: u32) -> Self {
        Self {
            header: Header::new(),
            cost,
            key,
            value,
        }
    }
}

impl<K: Send + Sync, V: Send + Sync> Node<K, V> for CostNode<K, V> {
    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    fn cost(&self) -> u32 {
        self.cost
    }
}

/// Base layout plus expiration time and expiration-queue links.
#[derive(Debug)]
pub struct ExpirationNode<K, V> {
    header: Header,
    exp: ExpLinks,
    expiration: u32,
    key: K,
    value: V,
}

impl<K, V> ExpirationNode<K, V> {
    pub fn new(key: K, value: V, expiration: u32) -> Self {
        Self {
            header: Header::new(),
            exp: ExpLinks::new(),
            expiration,
            key,
            value,
        }
    }
}

impl<K: Send + Sync, V: Send + Sync> Node<K, V> for ExpirationNode<K, V> {
    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    fn expiration(&self) -> u32 {
        self.expiration
    }

    #[inline]
    fn exp_links(&self) -> Option<&ExpLinks> {
        Some(&self.exp)
    }
}

/// All optional fields.
#[derive(Debug)]
pub struct ExpirationCostNode<K, V> {
    header: Header,
    exp: ExpLinks,
    expiration: u32,
    cost: u32,
    key: K,
    value: V,
}

impl<K, V> ExpirationCostNode<K, V> {
    pub fn new(key: K, value: V, expiration: u32, cost: u32) -> Self {
        Self {
            header: Header::new(),
            exp: ExpLinks::new(),
            expiration,
            cost,
            key,
            value,
        }
    }
}

impl<K: Send + Sync, V: Send + Sync> Node<K, V> for ExpirationCostNode<K, V> {
    #[inline]
    fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    fn expiration(&self) -> u32 {
        self.expiration
    }

    #[inline]
    fn cost(&self) -> u32 {
        self.cost
    }

    #[inline]
    fn exp_links(&self) -> Option<&ExpLinks> {
        Some(&self.exp)
    }
}
