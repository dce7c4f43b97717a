mod common;
mod defensibility;
mod signals;
mod transitions;
