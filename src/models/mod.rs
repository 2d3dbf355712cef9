pub mod bitmap;
pub mod encoding;
pub mod iso_message;
pub mod iso_type;
pub mod iso_value;
