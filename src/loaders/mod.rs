pub mod obj;

pub use self::obj::{load_obj, LoadedPrimitive};
