mod invocation;
mod lifecycle;
