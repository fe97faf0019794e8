mod leak;
mod quality;
mod telemetry;
