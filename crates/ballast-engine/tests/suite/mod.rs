mod support;

mod cleanup;
mod diagnostics;
mod pressure;
mod purge;
mod quality;
