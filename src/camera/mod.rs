pub mod sim_server;
