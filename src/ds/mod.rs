pub mod shard;
pub mod slot_arena;
pub mod write_buffer;

pub use shard::ShardedTable;
pub use slot_arena::{SlotArena, SlotId};
pub use write_buffer::WriteBuffer;
