//! Descriptor-count checks. Kept to a single test so nothing else in this
//! binary opens or closes descriptors while the count is taken.

#![cfg(target_os = "linux")]

use std::os::fd::OwnedFd;

use ipcwire::payload::{receive_data, send_data, ReceivePayload, RequestHeader};
use ipcwire::transport::{ChannelHandle, FileHandle, IpcStream};

fn open_descriptor_count() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

fn message_with_handles() -> (RequestHeader<FileHandle>, Vec<OwnedFd>) {
    let (a, b) = IpcStream::pair().unwrap();
    let (c, d) = IpcStream::pair().unwrap();
    let header = RequestHeader::<FileHandle> {
        file_descriptors: vec![FileHandle::Local(a.into()), FileHandle::Local(b.into())],
        ..Default::default()
    };
    (header, vec![c.into(), d.into()])
}

#[test]
fn receive_and_discard_cycles_keep_descriptor_count_stable() {
    let (left, right) = IpcStream::pair().unwrap();

    // Warm up once so lazily opened process descriptors are already counted.
    let (header, _extra) = message_with_handles();
    send_data(&left, &header).unwrap();
    drop(receive_data::<RequestHeader<FileHandle>>(&right).unwrap());
    drop(header);

    let baseline = open_descriptor_count();
    for _ in 0..50 {
        // Decoded and dropped.
        let (header, extra) = message_with_handles();
        send_data(&left, &header).unwrap();
        drop(header);
        drop(receive_data::<RequestHeader<FileHandle>>(&right).unwrap());

        // Received and never decoded.
        let mut payload = ReceivePayload::new();
        let channel = ChannelHandle::Local {
            data: extra.into_iter().next().unwrap(),
            event: IpcStream::pair().unwrap().0.into(),
        };
        struct Carry {
            channel: ChannelHandle,
        }
        ipcwire::wire_struct! { Carry { channel } }
        send_data(&left, &Carry { channel }).unwrap();
        payload.receive(&right).unwrap();
        assert_eq!(payload.pending_file_descriptors(), 2);
        drop(payload);

        // Decoded as bare references, so every descriptor stays in the payload.
        let (header, _extra) = message_with_handles();
        send_data(&left, &header).unwrap();
        drop(header);
        drop(receive_data::<RequestHeader<i32>>(&right).unwrap());
    }

    assert_eq!(open_descriptor_count(), baseline);
}
