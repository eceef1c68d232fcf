use std::time::Duration;

/// A single queued cache write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    SetAdd { key: String, member: String },
    Expire { key: String, ttl: Duration },
}

/// Batch of cache writes sent to the backend in one round trip.
#[derive(Debug, Default, Clone)]
pub struct Pipeline {
    ops: Vec<CacheOp>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sadd(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(CacheOp::SetAdd {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    /// Sets the expiry of an existing key. Has no effect if the key is missing
    /// when the pipeline is applied.
    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.ops.push(CacheOp::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }
}
