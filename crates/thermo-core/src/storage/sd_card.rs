use embedded_sdmmc::{
    Error, Mode, RawDirectory, RawFile, RawVolume, SdCard, SdCardError, TimeSource, Timestamp,
    VolumeIdx, VolumeManager,
};
use log::warn;

use super::LogStore;
use crate::time::{CalendarTime, Clock};

/// 8.3 name of the telemetry log in the root directory
pub const LOG_FILE_NAME: &str = "LOG.TXT";

/// Handles of the log while a scan is in progress
struct ReadSession {
    volume: RawVolume,
    dir: RawDirectory,
    file: RawFile,
    /// Offset the next sequential read starts at
    offset: u32,
}

/// Telemetry log in the root directory of the card's first volume.
///
/// SD card operations are blocking. Appends, size queries and clears open
/// the volume, act and close everything again. A scan keeps the file open
/// while it reads forward and closes it at end of log, on error, or before
/// any other operation.
pub struct SdCardLogStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
    file_name: &'static str,
    session: Option<ReadSession>,
}

impl<S, D, T> SdCardLogStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Create a log store on the first volume of the card
    pub fn new(sd_card: SdCard<S, D>, ts: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, ts),
            file_name: LOG_FILE_NAME,
            session: None,
        }
    }

    fn open_session(&self, offset: u32) -> Result<Option<ReadSession>, Error<SdCardError>> {
        let volume = self.volume_mgr.open_raw_volume(VolumeIdx(0))?;
        let dir = match self.volume_mgr.open_root_dir(volume) {
            Ok(dir) => dir,
            Err(e) => {
                let _ = self.volume_mgr.close_volume(volume);
                return Err(e);
            }
        };
        let file = match self
            .volume_mgr
            .open_file_in_dir(dir, self.file_name, Mode::ReadOnly)
        {
            Ok(file) => file,
            Err(e) => {
                let _ = self.volume_mgr.close_dir(dir);
                let _ = self.volume_mgr.close_volume(volume);
                return Err(e);
            }
        };

        let session = ReadSession {
            volume,
            dir,
            file,
            offset,
        };

        let positioned = self.volume_mgr.file_length(session.file).and_then(|length| {
            if offset >= length {
                Ok(false)
            } else {
                self.volume_mgr
                    .file_seek_from_start(session.file, offset)
                    .map(|()| true)
            }
        });

        match positioned {
            Ok(true) => Ok(Some(session)),
            Ok(false) => {
                self.close_session(session);
                Ok(None)
            }
            Err(e) => {
                self.close_session(session);
                Err(e)
            }
        }
    }

    fn close_session(&self, session: ReadSession) {
        let closed = self
            .volume_mgr
            .close_file(session.file)
            .and_then(|()| self.volume_mgr.close_dir(session.dir))
            .and_then(|()| self.volume_mgr.close_volume(session.volume));

        if let Err(e) = closed {
            warn!("Closing log after scan failed: {:?}", e);
        }
    }

    fn end_scan(&mut self) {
        if let Some(session) = self.session.take() {
            self.close_session(session);
        }
    }
}

impl<S, D, T> Drop for SdCardLogStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    fn drop(&mut self) {
        self.end_scan();
    }
}

impl<S, D, T> LogStore for SdCardLogStore<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = Error<SdCardError>;

    fn append(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.end_scan();

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(self.file_name, Mode::ReadWriteCreateOrAppend)?;

        file.write(bytes)?;

        // Handles close on drop as well; closing explicitly surfaces errors.
        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let session = match self.session.take() {
            Some(session) if session.offset == offset => Some(session),
            stale => {
                if let Some(session) = stale {
                    self.close_session(session);
                }
                self.open_session(offset)?
            }
        };
        let Some(mut session) = session else {
            return Ok(0);
        };

        match self.volume_mgr.read(session.file, buf) {
            Ok(0) => {
                self.close_session(session);
                Ok(0)
            }
            Ok(read) => {
                session.offset += read as u32;
                self.session = Some(session);
                Ok(read)
            }
            Err(e) => {
                self.close_session(session);
                Err(e)
            }
        }
    }

    fn size(&mut self) -> Result<u32, Self::Error> {
        self.end_scan();

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;
        let file = root_dir.open_file_in_dir(self.file_name, Mode::ReadOnly)?;

        let length = file.length();

        file.close()?;
        root_dir.close()?;
        volume0.close()?;

        Ok(length)
    }

    fn clear(&mut self) -> Result<(), Self::Error> {
        self.end_scan();

        let volume0 = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume0.open_root_dir()?;

        match root_dir.delete_file_in_dir(self.file_name) {
            Ok(()) | Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        root_dir.close()?;
        volume0.close()?;

        Ok(())
    }
}

/// Stamps FAT directory entries with the node's wall clock
pub struct ClockTimeSource<C: Clock> {
    clock: C,
}

impl<C: Clock> ClockTimeSource<C> {
    pub const fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> TimeSource for ClockTimeSource<C> {
    fn get_timestamp(&self) -> Timestamp {
        let dt = CalendarTime::from_unix(self.clock.now());

        Timestamp {
            year_since_1970: (dt.year - 1970) as u8,
            zero_indexed_month: dt.month - 1,
            zero_indexed_day: dt.day - 1,
            hours: dt.hour,
            minutes: dt.minute,
            seconds: dt.second,
        }
    }
}
