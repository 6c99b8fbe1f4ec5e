/// An error that can occur while building a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
	OutOfRange(OutOfRange),
	InvalidBlockSize(InvalidBlockSize),
	InvalidId(InvalidId),
}

/// An error that can occur while parsing a packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParseError {
	HeaderNotFound(HeaderNotFound),
	TooShort(TooShort),
	InvalidLength(InvalidLength),
	InvalidChecksum(InvalidChecksum),
}

/// An error that can occur while using a transport.
#[derive(Debug)]
pub enum TransportError {
	Io(std::io::Error),
	ShortWrite(ShortWrite),
	Unsupported(&'static str),
}

/// An error that can occur during a request/response transfer.
#[derive(Debug)]
pub enum TransferError {
	/// Transmitting the request failed.
	Write(TransportError),

	/// No response arrived within the requested window.
	Timeout,

	/// The engine was closed while the request was pending.
	Closed,
}

/// A value passed to a packet builder was outside its documented range.
#[derive(Debug, Clone, PartialEq)]
pub struct OutOfRange {
	pub what: &'static str,
	pub value: f32,
	pub min: f32,
	pub max: f32,
}

/// A sync write block did not have the advertised write length.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidBlockSize {
	pub actual: usize,
	pub expected: usize,
}

/// A servo identifier outside the addressable range.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidId {
	pub actual: u8,
	pub max: u8,
}

/// The input does not start with the `0xFF 0xFF` packet header.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HeaderNotFound;

/// The input is shorter than the length claimed by the packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TooShort {
	pub actual: usize,
	pub expected: usize,
}

/// The length byte claims less than a packet can contain.
///
/// The length always counts the error byte and the checksum, so values
/// below 2 cannot belong to a real frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidLength {
	pub actual: u8,
}

/// The packet checksum does not match the packet contents.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidChecksum {
	pub message: u8,
	pub computed: u8,
}

/// Fewer bytes were written than requested.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShortWrite {
	pub written: usize,
	pub expected: usize,
}

impl OutOfRange {
	pub fn check(what: &'static str, value: f32, min: f32, max: f32) -> Result<(), Self> {
		if value >= min && value <= max {
			Ok(())
		} else {
			Err(Self { what, value, min, max })
		}
	}
}

impl InvalidBlockSize {
	pub fn check(actual: usize, expected: usize) -> Result<(), Self> {
		if actual == expected {
			Ok(())
		} else {
			Err(Self { actual, expected })
		}
	}
}

impl InvalidId {
	pub fn check(actual: u8, max: u8) -> Result<(), Self> {
		if actual <= max {
			Ok(())
		} else {
			Err(Self { actual, max })
		}
	}
}

impl InvalidChecksum {
	pub fn check(message: u8, computed: u8) -> Result<(), Self> {
		if message == computed {
			Ok(())
		} else {
			Err(Self { message, computed })
		}
	}
}

impl ShortWrite {
	pub fn check(written: usize, expected: usize) -> Result<(), Self> {
		if written == expected {
			Ok(())
		} else {
			Err(Self { written, expected })
		}
	}
}

impl From<OutOfRange> for BuildError {
	fn from(other: OutOfRange) -> Self {
		Self::OutOfRange(other)
	}
}

impl From<InvalidBlockSize> for BuildError {
	fn from(other: InvalidBlockSize) -> Self {
		Self::InvalidBlockSize(other)
	}
}

impl From<InvalidId> for BuildError {
	fn from(other: InvalidId) -> Self {
		Self::InvalidId(other)
	}
}

impl From<HeaderNotFound> for ParseError {
	fn from(other: HeaderNotFound) -> Self {
		Self::HeaderNotFound(other)
	}
}

impl From<TooShort> for ParseError {
	fn from(other: TooShort) -> Self {
		Self::TooShort(other)
	}
}

impl From<InvalidLength> for ParseError {
	fn from(other: InvalidLength) -> Self {
		Self::InvalidLength(other)
	}
}

impl From<InvalidChecksum> for ParseError {
	fn from(other: InvalidChecksum) -> Self {
		Self::InvalidChecksum(other)
	}
}

impl From<std::io::Error> for TransportError {
	fn from(other: std::io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<ShortWrite> for TransportError {
	fn from(other: ShortWrite) -> Self {
		Self::ShortWrite(other)
	}
}

impl From<TransportError> for TransferError {
	fn from(other: TransportError) -> Self {
		Self::Write(other)
	}
}

impl std::error::Error for BuildError {}
impl std::error::Error for ParseError {}
impl std::error::Error for TransportError {}
impl std::error::Error for TransferError {}
impl std::error::Error for OutOfRange {}
impl std::error::Error for InvalidBlockSize {}
impl std::error::Error for InvalidId {}
impl std::error::Error for HeaderNotFound {}
impl std::error::Error for TooShort {}
impl std::error::Error for InvalidLength {}
impl std::error::Error for InvalidChecksum {}
impl std::error::Error for ShortWrite {}

impl std::fmt::Display for BuildError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::OutOfRange(e) => write!(f, "{}", e),
			Self::InvalidBlockSize(e) => write!(f, "{}", e),
			Self::InvalidId(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for ParseError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::HeaderNotFound(e) => write!(f, "{}", e),
			Self::TooShort(e) => write!(f, "{}", e),
			Self::InvalidLength(e) => write!(f, "{}", e),
			Self::InvalidChecksum(e) => write!(f, "{}", e),
		}
	}
}

impl std::fmt::Display for TransportError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::ShortWrite(e) => write!(f, "{}", e),
			Self::Unsupported(what) => write!(f, "unsupported serial configuration: {}", what),
		}
	}
}

impl std::fmt::Display for TransferError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		match self {
			Self::Write(e) => write!(f, "failed to transmit request: {}", e),
			Self::Timeout => write!(f, "timed out waiting for a response"),
			Self::Closed => write!(f, "the bus was closed"),
		}
	}
}

impl std::fmt::Display for OutOfRange {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(
			f,
			"{} out of range: got {}, expected a value in [{}, {}]",
			self.what, self.value, self.min, self.max
		)
	}
}

impl std::fmt::Display for InvalidBlockSize {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid sync write block: expected {} bytes, got {}", self.expected, self.actual)
	}
}

impl std::fmt::Display for InvalidId {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid servo ID {:#04X}, expected a value up to {:#04X}", self.actual, self.max)
	}
}

impl std::fmt::Display for HeaderNotFound {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "packet does not start with the 0xFF 0xFF header")
	}
}

impl std::fmt::Display for TooShort {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "packet too short: need {} bytes, got {}", self.expected, self.actual)
	}
}

impl std::fmt::Display for InvalidLength {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid packet length {:#04X}, expected at least 2", self.actual)
	}
}

impl std::fmt::Display for InvalidChecksum {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "invalid checksum, message claims {:#04X}, computed {:#04X}", self.message, self.computed)
	}
}

impl std::fmt::Display for ShortWrite {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "short write: wrote {} of {} bytes", self.written, self.expected)
	}
}
