pub mod mcp_server;
pub mod transport;
