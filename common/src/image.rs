/// Pixel encodings understood on the bus.
pub mod encodings {
    pub const RGB8: &str = "rgb8";
    pub const BGR8: &str = "bgr8";
    pub const RGBA8: &str = "rgba8";
    pub const BGRA8: &str = "bgra8";
    pub const MONO8: &str = "mono8";
}

/// Capture metadata carried with every image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Capture time, Unix millis.
    pub stamp_ms: i64,
    pub seq: u64,
    /// Coordinate frame of the camera that produced the image.
    pub frame_id: String,
}

impl Header {
    /// Milliseconds elapsed since capture, by the local clock.
    pub fn age_ms(&self) -> i64 {
        chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(self.stamp_ms)
    }
}

/// An uncompressed camera image as it travels over the bus.
///
/// Binary wire format (for Kafka messages), integers big-endian:
///
///   [0]        version = 0x01
///   [1]        is_bigendian
///   [2..10]    stamp_ms      (i64)
///   [10..18]   seq           (u64)
///   [18..22]   height        (u32)
///   [22..26]   width         (u32)
///   [26..30]   step          (u32)
///   [30]       encoding_len  (u8),  followed by the encoding string
///   [..]       frame_id_len  (u16), followed by the frame_id string
///   [..]       data_len      (u32), followed by the pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

const WIRE_VERSION: u8 = 0x01;
const FIXED_HEADER_SIZE: usize = 31; // version..encoding_len inclusive

impl ImageMessage {
    pub fn new(
        header: Header,
        width: u32,
        height: u32,
        encoding: &str,
        step: u32,
        data: Vec<u8>,
    ) -> Self {
        Self {
            header,
            height,
            width,
            encoding: encoding.to_string(),
            is_bigendian: 0,
            step,
            data,
        }
    }

    /// Message key for the bus: `{frame_id}:{stamp_ms}`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.header.frame_id, self.header.stamp_ms)
    }

    // -- Serialization ----------------------------------------------------------

    /// Serialize to binary format for Kafka payload.
    ///
    /// Encoding and frame_id are truncated to their length-prefix limits
    /// (255 and 65535 bytes); in practice both are short identifiers.
    pub fn serialize(&self) -> Vec<u8> {
        let encoding = truncate(self.encoding.as_bytes(), u8::MAX as usize);
        let frame_id = truncate(self.header.frame_id.as_bytes(), u16::MAX as usize);

        let mut buf = Vec::with_capacity(
            FIXED_HEADER_SIZE + encoding.len() + 2 + frame_id.len() + 4 + self.data.len(),
        );
        buf.push(WIRE_VERSION);
        buf.push(self.is_bigendian);
        buf.extend_from_slice(&self.header.stamp_ms.to_be_bytes());
        buf.extend_from_slice(&self.header.seq.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.width.to_be_bytes());
        buf.extend_from_slice(&self.step.to_be_bytes());
        buf.push(encoding.len() as u8);
        buf.extend_from_slice(encoding);
        buf.extend_from_slice(&(frame_id.len() as u16).to_be_bytes());
        buf.extend_from_slice(frame_id);
        buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Deserialize from binary Kafka payload.
    pub fn deserialize(data: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader { data, pos: 0 };

        let version = r.u8()?;
        if version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(version));
        }
        let is_bigendian = r.u8()?;
        let stamp_ms = i64::from_be_bytes(r.array()?);
        let seq = u64::from_be_bytes(r.array()?);
        let height = u32::from_be_bytes(r.array()?);
        let width = u32::from_be_bytes(r.array()?);
        let step = u32::from_be_bytes(r.array()?);

        let encoding_len = r.u8()? as usize;
        let encoding = r.utf8(encoding_len, "encoding")?;
        let frame_id_len = u16::from_be_bytes(r.array()?) as usize;
        let frame_id = r.utf8(frame_id_len, "frame_id")?;
        let data_len = u32::from_be_bytes(r.array()?) as usize;
        let pixels = r.take(data_len)?.to_vec();

        Ok(Self {
            header: Header {
                stamp_ms,
                seq,
                frame_id,
            },
            height,
            width,
            encoding,
            is_bigendian,
            step,
            data: pixels,
        })
    }
}

fn truncate(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[..bytes.len().min(max)]
}

/// Bounds-checked cursor over a wire payload.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(WireError::TooShort {
                got: self.data.len(),
                expected: self.pos.saturating_add(n),
            }),
        }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn utf8(&mut self, n: usize, field: &'static str) -> Result<String, WireError> {
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8(field))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("image payload too short: got {got} bytes, expected at least {expected}")]
    TooShort { got: usize, expected: usize },
    #[error("unknown image wire version {0:#04x}")]
    UnknownVersion(u8),
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}
