mod kernel;
mod scenario;
