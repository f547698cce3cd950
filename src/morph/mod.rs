pub mod location;
pub mod morph_db;
pub mod morpheme;

pub use location::{
    FieldKey,
    Location,
    Maturity,
};
pub use morph_db::{
    DbMeta,
    MorphDb,
};
pub use morpheme::Morpheme;
