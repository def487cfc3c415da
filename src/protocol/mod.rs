pub mod pkt_line;
