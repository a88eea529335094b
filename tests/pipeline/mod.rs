mod lifecycle;
mod tcp_stream;
