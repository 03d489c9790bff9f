pub mod list;
pub mod synth;
pub mod userdata;
