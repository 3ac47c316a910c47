mod handler;

pub use handler::ModuleHandler;
