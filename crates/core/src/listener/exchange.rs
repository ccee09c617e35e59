//! Remote address exchange
//!
//! The anonymity network hides who is dialing, so right after the upgrade
//! the dialer opens one stream and announces its own dialable address:
//!
//! | byte | meaning |
//! |------|---------|
//! | 0    | tag: `ENCODE_ONION` (39 bytes follow), `ENCODE_ONION3` (14 bytes follow), anything else: no address |
//! | 1..  | binary multiaddress |
//!
//! The acceptor uses the address if it can parse it and otherwise carries
//! on without one. Only a broken stream is an error.

use crate::address::{self, ExchangeTag};
use multiaddr::Multiaddr;
use onion_transport_common::protocol::NO_ADDRESS;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Read the dialer's announcement.
///
/// `Ok(None)` covers peers that send an unknown tag or an unparseable
/// address. Any read failure, including the stream ending early, is an
/// error.
pub async fn read_remote_addr<S>(stream: &mut S) -> io::Result<Option<Multiaddr>>
where
    S: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    stream.read_exact(&mut tag).await?;

    let Some(tag) = ExchangeTag::from_byte(tag[0]) else {
        debug!("Peer announced no address (tag {:#04x})", tag[0]);
        return Ok(None);
    };

    let mut payload = vec![0u8; tag.payload_len()];
    stream.read_exact(&mut payload).await?;

    match address::decode_payload(&payload) {
        Ok(addr) => Ok(Some(addr)),
        Err(e) => {
            debug!("Ignoring malformed announced address: {}", e);
            Ok(None)
        }
    }
}

/// Announce `addr` to the acceptor.
///
/// Without an address, or with one that fits no frame, a bare
/// [`NO_ADDRESS`] tag is sent so the acceptor doesn't wait for a payload.
pub async fn write_local_addr<S>(stream: &mut S, addr: Option<&Multiaddr>) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let frame = match addr.map(address::encode_frame) {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            debug!("Not announcing local address: {}", e);
            vec![NO_ADDRESS]
        }
        None => vec![NO_ADDRESS],
    };

    stream.write_all(&frame).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{onion_multiaddr, ONION3_FRAME_LEN, ONION_FRAME_LEN};
    use crate::test_utils::{v2_service, v3_service};
    use onion_transport_common::protocol::{ENCODE_ONION, ENCODE_ONION3};

    async fn read_from(bytes: &[u8]) -> io::Result<Option<Multiaddr>> {
        let (mut client, mut server) = tokio::io::duplex(128);
        client.write_all(bytes).await.unwrap();
        drop(client);
        read_remote_addr(&mut server).await
    }

    #[tokio::test]
    async fn test_roundtrip_onion3_address() {
        let addr = v3_service(9001).multiaddr().unwrap();
        let (mut client, mut server) = tokio::io::duplex(128);

        write_local_addr(&mut client, Some(&addr)).await.unwrap();
        let read = read_remote_addr(&mut server).await.unwrap();

        assert_eq!(read, Some(addr));
    }

    #[tokio::test]
    async fn test_roundtrip_onion_address() {
        let addr = v2_service(80).multiaddr().unwrap();
        let (mut client, mut server) = tokio::io::duplex(128);

        write_local_addr(&mut client, Some(&addr)).await.unwrap();
        let read = read_remote_addr(&mut server).await.unwrap();

        assert_eq!(read, Some(addr));
    }

    #[tokio::test]
    async fn test_payload_split_across_writes() {
        let addr = v3_service(9001).multiaddr().unwrap();
        let mut frame = vec![ENCODE_ONION];
        frame.extend_from_slice(&addr.to_vec());

        let (mut client, mut server) = tokio::io::duplex(128);
        let reader = tokio::spawn(async move { read_remote_addr(&mut server).await });

        for chunk in frame.chunks(5) {
            client.write_all(chunk).await.unwrap();
            tokio::task::yield_now().await;
        }

        assert_eq!(reader.await.unwrap().unwrap(), Some(addr));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_not_an_error() {
        assert_eq!(read_from(&[0x7f]).await.unwrap(), None);
        assert_eq!(read_from(&[NO_ADDRESS, 1, 2, 3]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_not_an_error() {
        let mut frame = vec![ENCODE_ONION3];
        frame.extend_from_slice(&[0xff; ONION3_FRAME_LEN]);

        assert_eq!(read_from(&frame).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let addr = v3_service(9001).multiaddr().unwrap();
        let mut frame = vec![ENCODE_ONION];
        frame.extend_from_slice(&addr.to_vec()[..ONION_FRAME_LEN - 10]);

        let err = read_from(&frame).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_error() {
        let err = read_from(&[]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_write_without_address() {
        let (mut client, mut server) = tokio::io::duplex(16);
        write_local_addr(&mut client, None).await.unwrap();
        drop(client);

        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, vec![NO_ADDRESS]);
    }

    #[tokio::test]
    async fn test_write_unframeable_address() {
        let tcp: Multiaddr = "/ip4/127.0.0.1/tcp/4001".parse().unwrap();
        let (mut client, mut server) = tokio::io::duplex(16);
        write_local_addr(&mut client, Some(&tcp)).await.unwrap();
        drop(client);

        let mut sent = Vec::new();
        server.read_to_end(&mut sent).await.unwrap();
        assert_eq!(sent, vec![NO_ADDRESS]);
    }

    #[test]
    fn test_frame_matches_codec() {
        let addr = onion_multiaddr(false, &v2_service(1).id, 1).unwrap();
        let frame = address::encode_frame(&addr).unwrap();
        assert_eq!(frame[0], ENCODE_ONION3);
        assert_eq!(frame.len(), 1 + ONION3_FRAME_LEN);
    }
}
