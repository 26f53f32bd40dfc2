//! Descriptor echo: a client hands the server a pipe and the server writes into it.
//!
//! Run with:
//!   IPCWIRE_LOG=debug cargo run --example fd-echo
//!
//! The client sends a request carrying the pipe's write end plus a short
//! body. The server writes the body back through the received descriptor
//! and answers with a response header.

use std::fs::{self, File};
use std::io::{IoSlice, Read, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::time::Duration;

use ipcwire::payload::{
    init_request, receive_data, receive_request_body, send_data, send_request, RequestHeader,
    ResponseHeader,
};
use ipcwire::transport::{wait_for_endpoint, EndpointListener, FileHandle};
use tracing::info;
use tracing::level_filters::LevelFilter;

const OP_ECHO: i32 = 1;

fn init_logging() {
    let level = std::env::var("IPCWIRE_LOG")
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::INFO);
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: pipe(2) succeeded, so both descriptors are open and ours.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn serve(listener: EndpointListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let conn = listener.accept()?;
    let request: RequestHeader<FileHandle> = receive_data(&conn)?;
    info!(op = request.op, cred = ?request.cred, "request received");

    let mut body = vec![0u8; request.max_recv_len as usize];
    let len = receive_request_body(&conn, &request, &mut body)?;

    let mut written = 0u32;
    if let Some(FileHandle::Local(fd)) = request.file_descriptors.into_iter().next() {
        let mut sink = File::from(fd);
        sink.write_all(&body[..len])?;
        written = len as u32;
    }

    let response = ResponseHeader::<FileHandle> {
        ret_code: 0,
        recv_len: written,
        ..Default::default()
    };
    send_data(&conn, &response)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    let sock_dir = std::env::temp_dir().join(format!("ipcwire-fd-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = EndpointListener::bind(&sock_path)?.with_pass_credentials(true);
    let server = std::thread::spawn(move || serve(listener));

    let conn = wait_for_endpoint(&sock_path, Duration::from_secs(2))?;
    let (read_end, write_end) = pipe()?;

    let mut request = RequestHeader::<FileHandle> {
        file_descriptors: vec![FileHandle::Local(write_end)],
        ..Default::default()
    };
    let message = b"hello through a descriptor";
    init_request(&mut request, OP_ECHO, message.len() as u32, 64, false)?;
    send_request(&conn, &mut request, &[IoSlice::new(message)])?;
    // Our copy of the write end must close, or the read below never sees EOF.
    drop(request);

    let response: ResponseHeader<FileHandle> = receive_data(&conn)?;
    info!(ret = response.ret_code, bytes = response.recv_len, "response received");

    server
        .join()
        .map_err(|_| std::io::Error::other("server thread panicked"))??;

    let mut echoed = String::new();
    File::from(read_end).read_to_string(&mut echoed)?;
    println!("{echoed}");

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
