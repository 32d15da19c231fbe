use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    sync::{Arc, Mutex},
};

use log::{info, trace};

#[derive(Debug, PartialEq)]
pub enum DiskError {
    IncorrectSectorSize,
    OverCapacity,
    /// The image on the host was created with another sector size or capacity.
    GeometryMismatch { sector_size: u32, capacity: u32 },
    Io(std::io::ErrorKind),
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e.kind())
    }
}

const HEADER_SIZE: usize = size_of::<u32>() * 2;

/// A sector-addressed block device backed by an image file.
///
/// The image starts with a small header recording the sector size and the
/// capacity, so `connect` can refuse an image built with other geometry.
/// Clones share the same open file.
#[derive(Debug, Clone)]
pub struct Disk<const SECTOR_SIZE: usize, const CAPACITY: usize> {
    file_name: String,
    file: Arc<Mutex<File>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut disk_name = String::from("DISK_IMAGE_");
    disk_name.push_str(&name);
    disk_name
}

fn write_header(file: &mut File, sector_size: u32, capacity: u32) -> Result<(), std::io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&sector_size.to_be_bytes())?;
    file.write_all(&capacity.to_be_bytes())?;
    Ok(())
}

fn read_header(file: &mut File) -> Result<(u32, u32), std::io::Error> {
    let mut sector_size = [0; size_of::<u32>()];
    let mut capacity = [0; size_of::<u32>()];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut sector_size)?;
    file.read_exact(&mut capacity)?;
    Ok((u32::from_be_bytes(sector_size), u32::from_be_bytes(capacity)))
}

impl<const SECTOR_SIZE: usize, const CAPACITY: usize> Disk<SECTOR_SIZE, CAPACITY> {
    const GEOMETRY_OK: () = assert!(
        SECTOR_SIZE > 0 && CAPACITY % SECTOR_SIZE == 0,
        "Capacity must be a multiple of the sector size"
    );

    /// Creates a zeroed image, replacing any image of the same name.
    pub fn create(name: &str) -> Result<Self, DiskError> {
        let () = Self::GEOMETRY_OK;
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .read(true)
            .create(true)
            .open(make_name(name))?;
        file.set_len((HEADER_SIZE + CAPACITY) as u64)?;
        write_header(&mut file, SECTOR_SIZE as u32, CAPACITY as u32)?;
        info!(
            "Created disk {} with {} sectors of {} bytes",
            name,
            Self::sector_count(),
            SECTOR_SIZE
        );
        Ok(Self {
            file_name: String::from(name),
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Opens an existing image, checking its geometry.
    pub fn connect(name: &str) -> Result<Self, DiskError> {
        let () = Self::GEOMETRY_OK;
        let mut file = File::options()
            .write(true)
            .read(true)
            .open(make_name(name))?;
        let (sector_size, capacity) = read_header(&mut file)?;
        if sector_size as usize != SECTOR_SIZE || capacity as usize != CAPACITY {
            return Err(DiskError::GeometryMismatch {
                sector_size,
                capacity,
            });
        }
        Ok(Self {
            file_name: String::from(name),
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn name(&self) -> &str {
        &self.file_name
    }

    pub const fn sector_size() -> usize {
        SECTOR_SIZE
    }

    pub const fn sector_count() -> usize {
        CAPACITY / SECTOR_SIZE
    }

    fn check(sector: usize, len: usize) -> Result<u64, DiskError> {
        if len != SECTOR_SIZE {
            Err(DiskError::IncorrectSectorSize)
        } else if sector >= Self::sector_count() {
            Err(DiskError::OverCapacity)
        } else {
            Ok((HEADER_SIZE + sector * SECTOR_SIZE) as u64)
        }
    }

    pub fn read_sector(&self, sector: usize) -> Result<Box<[u8; SECTOR_SIZE]>, DiskError> {
        let mut buf = Box::new([0; SECTOR_SIZE]);
        self.read_sector_into(sector, &mut *buf)?;
        Ok(buf)
    }

    /// Reads one sector into `buf`, which must be exactly one sector long.
    pub fn read_sector_into(&self, sector: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        let position = Self::check(sector, buf.len())?;
        let mut file = self.file.lock().unwrap();
        trace!("{}: reading sector {}", self.file_name, sector);
        file.seek(SeekFrom::Start(position))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_sector(&self, sector: usize, data: &[u8]) -> Result<(), DiskError> {
        let position = Self::check(sector, data.len())?;
        let mut file = self.file.lock().unwrap();
        trace!("{}: writing sector {}", self.file_name, sector);
        file.seek(SeekFrom::Start(position))?;
        file.write_all(data)?;
        Ok(())
    }
}
