//! Ids for use in typed collections.

util::id!(NodeId, u16);
