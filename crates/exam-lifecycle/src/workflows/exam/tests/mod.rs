mod common;
mod papers;
