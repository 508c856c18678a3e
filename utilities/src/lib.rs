pub mod line_tcp;
pub mod poll;
