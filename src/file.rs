//! The file facade: opens a file, probes its format, runs the parse
//! phases and applies changes through the rewrite engines.

use crate::attachment::StreamProvider;
use crate::config::{MediaFileConfig, TagCreationSettings, TagUsage};
use crate::diag::Diagnostics;
use crate::error::{Error, Result};
use crate::id3::v1::Id3v1Tag;
use crate::id3::v2::Id3v2Tag;
use crate::matroska::{MatroskaContainer, MatroskaTag, SavePlan};
use crate::mp3::Mp3Container;
use crate::mp4::Mp4Brand;
use crate::ogg::OggContainer;
use crate::progress::Progress;
use crate::sig::{ContainerFormat, MediaType};
use crate::tag::Tag;
use crate::track::Track;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Progress of one parse phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ParsingStatus {
    /// The phase has not run yet.
    #[default]
    NotParsedYet,
    /// The phase ran and produced a usable result.
    Ok,
    /// The file format does not support the phase.
    NotSupported,
    /// The phase failed.
    CriticalFailure,
}

#[derive(Debug, Default)]
enum ContainerImpl {
    #[default]
    None,
    Matroska(Box<MatroskaContainer>),
    Ogg(Box<OggContainer>),
    Mp3(Box<Mp3Container>),
    Mp4(Mp4Brand),
}

/// A media file opened for tag reading and writing.
///
/// The facade owns the underlying stream; the container drivers and all
/// elements borrow it per call. A single caller thread is expected; only
/// the abort flag of a [`Progress`] handle may be touched from elsewhere.
#[derive(Debug)]
pub struct MediaFile {
    path: PathBuf,
    stream: File,
    file_size: u64,
    /// Parse and save configuration.
    pub config: MediaFileConfig,
    format: ContainerFormat,
    container: ContainerImpl,
    container_status: ParsingStatus,
    tracks_status: ParsingStatus,
    tags_status: ParsingStatus,
    chapters_status: ParsingStatus,
    attachments_status: ParsingStatus,
    tracks: Vec<Track>,
}

impl MediaFile {
    /// Opens the file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<MediaFile> {
        let path = path.into();
        let stream = File::open(&path)?;
        let file_size = stream.metadata()?.len();
        Ok(MediaFile {
            path,
            stream,
            file_size,
            config: MediaFileConfig::default(),
            format: ContainerFormat::Unknown,
            container: ContainerImpl::None,
            container_status: ParsingStatus::default(),
            tracks_status: ParsingStatus::default(),
            tags_status: ParsingStatus::default(),
            chapters_status: ParsingStatus::default(),
            attachments_status: ParsingStatus::default(),
            tracks: Vec::new(),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// The detected container format.
    pub fn container_format(&self) -> ContainerFormat {
        self.format
    }

    /// Status of the container parse phase.
    pub fn container_status(&self) -> ParsingStatus {
        self.container_status
    }

    /// Status of the tracks parse phase.
    pub fn tracks_status(&self) -> ParsingStatus {
        self.tracks_status
    }

    /// Status of the tags parse phase.
    pub fn tags_status(&self) -> ParsingStatus {
        self.tags_status
    }

    /// Status of the chapters parse phase.
    pub fn chapters_status(&self) -> ParsingStatus {
        self.chapters_status
    }

    /// Status of the attachments parse phase.
    pub fn attachments_status(&self) -> ParsingStatus {
        self.attachments_status
    }

    /// Drops all parsed state so the next parse starts fresh.
    pub fn invalidate(&mut self) {
        self.container = ContainerImpl::None;
        self.container_status = ParsingStatus::NotParsedYet;
        self.tracks_status = ParsingStatus::NotParsedYet;
        self.tags_status = ParsingStatus::NotParsedYet;
        self.chapters_status = ParsingStatus::NotParsedYet;
        self.attachments_status = ParsingStatus::NotParsedYet;
        self.tracks.clear();
        self.format = ContainerFormat::Unknown;
    }

    fn reopen(&mut self) -> Result<()> {
        self.stream = File::open(&self.path)?;
        self.file_size = self.stream.metadata()?.len();
        Ok(())
    }

    /// Probes the signature and parses the container header. Idempotent.
    pub fn parse_container(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        if self.container_status != ParsingStatus::NotParsedYet {
            return Ok(());
        }
        progress.check()?;
        let context = "parsing container";
        let mut buffer = [0u8; 16];
        self.stream.seek(SeekFrom::Start(0))?;
        let read = read_up_to(&mut self.stream, &mut buffer)?;
        self.format = ContainerFormat::probe(&buffer[..read]);
        let result = match self.format {
            ContainerFormat::Ebml => {
                let mut container = Box::new(MatroskaContainer::new());
                let result = container.parse_header(
                    &mut self.stream,
                    self.file_size,
                    &self.config,
                    diag,
                    progress,
                );
                if result.is_ok() {
                    self.format = match container.doc_type() {
                        "webm" => ContainerFormat::Webm,
                        _ => ContainerFormat::Matroska,
                    };
                    self.container = ContainerImpl::Matroska(container);
                }
                result
            }
            ContainerFormat::Ogg => {
                let mut container = Box::new(OggContainer::new());
                let result =
                    container.parse_header(&mut self.stream, self.file_size, diag, progress);
                if result.is_ok() {
                    self.container = ContainerImpl::Ogg(container);
                }
                result
            }
            ContainerFormat::Id3v2Tag | ContainerFormat::MpegAudioFrames => {
                let mut container = Box::new(Mp3Container::new());
                let result =
                    container.parse_header(&mut self.stream, self.file_size, diag, progress);
                if result.is_ok() {
                    use crate::config::MediaFileFlags;
                    for tag in &mut container.id3v2_tags {
                        if self.config.flags.contains(MediaFileFlags::NORMALIZE_KNOWN_TAG_FIELD_IDS) {
                            tag.normalize_ids();
                        }
                        if self.config.flags.contains(MediaFileFlags::CONVERT_RECORD_DATE_FIELDS) {
                            tag.convert_record_date_fields();
                        }
                    }
                    self.container = ContainerImpl::Mp3(container);
                }
                result
            }
            ContainerFormat::Mp4 => match Mp4Brand::probe(&buffer[..read]) {
                Ok(brand) => {
                    self.container = ContainerImpl::Mp4(brand);
                    Ok(())
                }
                Err(error) => Err(error),
            },
            ContainerFormat::Unknown => {
                self.container_status = ParsingStatus::NotSupported;
                self.tags_status = ParsingStatus::NotSupported;
                return Ok(());
            }
            _ => {
                diag.info(
                    format!("no tag support for {}", self.format.name()),
                    context,
                );
                self.container_status = ParsingStatus::NotSupported;
                self.tags_status = ParsingStatus::NotSupported;
                return Ok(());
            }
        };
        match result {
            Ok(()) => {
                self.container_status = ParsingStatus::Ok;
                Ok(())
            }
            Err(error) => {
                diag.critical(format!("unable to parse the container: {error}"), context);
                self.container_status = ParsingStatus::CriticalFailure;
                Err(error)
            }
        }
    }

    fn require_container(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<bool> {
        self.parse_container(diag, progress)?;
        Ok(self.container_status == ParsingStatus::Ok)
    }

    /// Parses the track descriptors. Idempotent.
    pub fn parse_tracks(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        if self.tracks_status != ParsingStatus::NotParsedYet {
            return Ok(());
        }
        progress.check()?;
        if !self.require_container(diag, progress)? {
            self.tracks_status = ParsingStatus::NotSupported;
            return Ok(());
        }
        let result = match &mut self.container {
            ContainerImpl::Matroska(container) => {
                let result = container.parse_tracks(&mut self.stream, diag, progress);
                if result.is_ok() {
                    self.tracks = container.tracks.clone();
                }
                result
            }
            ContainerImpl::Ogg(container) => {
                self.tracks = container.tracks();
                Ok(())
            }
            ContainerImpl::Mp3(container) => {
                self.tracks = container
                    .first_frame
                    .iter()
                    .map(|frame| Track {
                        id: 1,
                        number: 1,
                        media_type: MediaType::Audio,
                        codec_id: container.technical_label(),
                        channels: frame.channels(),
                        sampling_frequency: frame.sampling_rate as f64,
                        ..Track::default()
                    })
                    .collect();
                Ok(())
            }
            _ => {
                self.tracks_status = ParsingStatus::NotSupported;
                return Ok(());
            }
        };
        match result {
            Ok(()) => {
                self.tracks_status = ParsingStatus::Ok;
                Ok(())
            }
            Err(error) => {
                diag.critical(format!("unable to parse tracks: {error}"), "parsing tracks");
                self.tracks_status = ParsingStatus::CriticalFailure;
                Err(error)
            }
        }
    }

    /// Parses the tags. Idempotent.
    pub fn parse_tags(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        if self.tags_status != ParsingStatus::NotParsedYet {
            return Ok(());
        }
        progress.check()?;
        if !self.require_container(diag, progress)? {
            if self.tags_status == ParsingStatus::NotParsedYet {
                self.tags_status = ParsingStatus::NotSupported;
            }
            return Ok(());
        }
        let result = match &mut self.container {
            ContainerImpl::Matroska(container) => {
                container.parse_tags(&mut self.stream, diag, progress)
            }
            ContainerImpl::Ogg(container) => {
                container.parse_tags(&mut self.stream, diag, progress)
            }
            // the ID3 tags were picked up together with the header
            ContainerImpl::Mp3(_) => Ok(()),
            ContainerImpl::Mp4(_) => {
                self.tags_status = ParsingStatus::NotSupported;
                return Err(Error::NotImplemented("MP4 tag parsing"));
            }
            ContainerImpl::None => {
                self.tags_status = ParsingStatus::NotSupported;
                return Ok(());
            }
        };
        match result {
            Ok(()) => {
                self.tags_status = ParsingStatus::Ok;
                Ok(())
            }
            Err(error) => {
                diag.critical(format!("unable to parse tags: {error}"), "parsing tags");
                self.tags_status = ParsingStatus::CriticalFailure;
                Err(error)
            }
        }
    }

    /// Parses the chapters. Idempotent.
    pub fn parse_chapters(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        if self.chapters_status != ParsingStatus::NotParsedYet {
            return Ok(());
        }
        progress.check()?;
        if !self.require_container(diag, progress)? {
            self.chapters_status = ParsingStatus::NotSupported;
            return Ok(());
        }
        let result = match &mut self.container {
            ContainerImpl::Matroska(container) => {
                container.parse_chapters(&mut self.stream, diag, progress)
            }
            _ => {
                self.chapters_status = ParsingStatus::NotSupported;
                return Ok(());
            }
        };
        match result {
            Ok(()) => {
                self.chapters_status = ParsingStatus::Ok;
                Ok(())
            }
            Err(error) => {
                diag.critical(format!("unable to parse chapters: {error}"), "parsing chapters");
                self.chapters_status = ParsingStatus::CriticalFailure;
                Err(error)
            }
        }
    }

    /// Parses the attachments. Idempotent.
    pub fn parse_attachments(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        if self.attachments_status != ParsingStatus::NotParsedYet {
            return Ok(());
        }
        progress.check()?;
        if !self.require_container(diag, progress)? {
            self.attachments_status = ParsingStatus::NotSupported;
            return Ok(());
        }
        let provider = StreamProvider::Path(self.path.clone());
        let result = match &mut self.container {
            ContainerImpl::Matroska(container) => {
                container.parse_attachments(&mut self.stream, &provider, diag, progress)
            }
            _ => {
                self.attachments_status = ParsingStatus::NotSupported;
                return Ok(());
            }
        };
        match result {
            Ok(()) => {
                self.attachments_status = ParsingStatus::Ok;
                Ok(())
            }
            Err(error) => {
                diag.critical(
                    format!("unable to parse attachments: {error}"),
                    "parsing attachments",
                );
                self.attachments_status = ParsingStatus::CriticalFailure;
                Err(error)
            }
        }
    }

    /// Runs every parse phase.
    pub fn parse_everything(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        self.parse_container(diag, progress)?;
        self.parse_tracks(diag, progress)?;
        let _ = self.parse_tags(diag, progress);
        self.parse_chapters(diag, progress)?;
        self.parse_attachments(diag, progress)?;
        Ok(())
    }

    /// The parsed track descriptors.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// All parsed tags, in file order.
    pub fn tags(&self) -> Vec<&dyn Tag> {
        let mut tags: Vec<&dyn Tag> = Vec::new();
        match &self.container {
            ContainerImpl::Matroska(container) => {
                tags.extend(container.tags.iter().map(|t| t as &dyn Tag));
            }
            ContainerImpl::Ogg(container) => {
                tags.extend(container.comments.iter().map(|t| t as &dyn Tag));
            }
            ContainerImpl::Mp3(container) => {
                tags.extend(container.id3v2_tags.iter().map(|t| t as &dyn Tag));
                if let Some(tag) = &container.id3v1_tag {
                    tags.push(tag as &dyn Tag);
                }
            }
            _ => {}
        }
        tags
    }

    /// The Matroska driver, when the file is a Matroska/WebM file.
    pub fn matroska(&mut self) -> Option<&mut MatroskaContainer> {
        match &mut self.container {
            ContainerImpl::Matroska(container) => Some(container),
            _ => None,
        }
    }

    /// The Ogg driver, when the file is an Ogg file.
    pub fn ogg(&mut self) -> Option<&mut OggContainer> {
        match &mut self.container {
            ContainerImpl::Ogg(container) => Some(container),
            _ => None,
        }
    }

    /// The MP3 driver, when the file is an MP3 file.
    pub fn mp3(&mut self) -> Option<&mut Mp3Container> {
        match &mut self.container {
            ContainerImpl::Mp3(container) => Some(container),
            _ => None,
        }
    }

    /// The parsed chapters (Matroska editions flattened to their chapters).
    pub fn chapters(&self) -> Vec<&crate::chapter::Chapter> {
        match &self.container {
            ContainerImpl::Matroska(container) => container
                .editions
                .iter()
                .flat_map(|e| e.chapters.iter())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The parsed attachments.
    pub fn attachments(&self) -> &[crate::attachment::Attachment] {
        match &self.container {
            ContainerImpl::Matroska(container) => &container.attachments,
            _ => &[],
        }
    }

    /// A short technical summary of the media content, e.g.
    /// `"MS-MPEG-4-480p / MP3-2ch-eng"`.
    pub fn technical_summary(&self) -> String {
        if let ContainerImpl::Mp3(container) = &self.container {
            return container.technical_label();
        }
        let labels: Vec<String> = self.tracks.iter().map(|t| t.technical_label()).collect();
        labels.join(" / ")
    }

    /// Creates or removes dialect-specific tags per `settings`.
    pub fn create_appropriate_tags(
        &mut self,
        settings: &TagCreationSettings,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        match &mut self.container {
            ContainerImpl::Matroska(container) => {
                for target in &settings.required_targets {
                    if !container.tags.iter().any(|t| t.target() == target) {
                        container.tags.push(MatroskaTag::with_target(target.clone()));
                    }
                }
                if settings.required_targets.is_empty() && container.tags.is_empty() {
                    container.tags.push(MatroskaTag::new());
                }
                Ok(())
            }
            ContainerImpl::Mp3(container) => {
                match settings.id3v2_usage {
                    TagUsage::Always => {
                        if container.id3v2_tags.is_empty() {
                            container
                                .id3v2_tags
                                .push(Id3v2Tag::with_version(settings.id3v2_major_version));
                        }
                    }
                    TagUsage::KeepExisting => {}
                    TagUsage::Never => {
                        let removed = std::mem::take(&mut container.id3v2_tags);
                        transfer_removed_values(
                            removed.iter().map(|t| t as &dyn Tag),
                            container,
                            settings,
                        );
                    }
                }
                match settings.id3v1_usage {
                    TagUsage::Always => {
                        if container.id3v1_tag.is_none() {
                            container.id3v1_tag = Some(Id3v1Tag::new());
                        }
                    }
                    TagUsage::KeepExisting => {}
                    TagUsage::Never => {
                        container.id3v1_tag = None;
                    }
                }
                Ok(())
            }
            ContainerImpl::Ogg(container) => {
                // comments come into being with the streams that carry
                // them; a stream without a comment packet cannot gain one
                // without re-muxing
                if container.comments.is_empty() && !container.streams.is_empty() {
                    diag.warn(
                        "no stream carries a comment packet to update",
                        "creating tags",
                    );
                }
                Ok(())
            }
            _ => Err(Error::NotImplemented("tag creation for this format")),
        }
    }

    /// Applies the pending changes by patching or rewriting the file.
    ///
    /// On any critical failure after the backup has been created, the
    /// original file is restored and the parser state reset; the error is
    /// re-raised.
    pub fn apply_changes(&mut self, diag: &mut Diagnostics, progress: &Progress) -> Result<()> {
        let context = "applying changes";
        progress.check()?;
        if self.container_status != ParsingStatus::Ok {
            diag.critical("the container has not been parsed", context);
            return Err(Error::NoDataFound);
        }
        // the rewrite observes the full effects of every parse phase
        self.parse_everything(diag, progress)?;
        let result = self.apply_changes_inner(diag, progress);
        match result {
            Ok(changed) => {
                if changed {
                    // start from a clean slate against the new file
                    self.invalidate();
                    self.reopen()?;
                }
                Ok(())
            }
            Err(error) => {
                self.invalidate();
                let _ = self.reopen();
                Err(error)
            }
        }
    }

    fn apply_changes_inner(
        &mut self,
        diag: &mut Diagnostics,
        progress: &Progress,
    ) -> Result<bool> {
        let path = self.path.clone();
        let config = self.config.clone();
        match &mut self.container {
            ContainerImpl::Matroska(container) => {
                let plan = container.plan_save(&mut self.stream, &config, diag)?;
                match plan {
                    SavePlan::NoChange => Ok(false),
                    SavePlan::InPlace(patch) => {
                        let mut stream = crate::io::open_read_write(&path)?;
                        container.apply_in_place(&mut stream, &patch)?;
                        Ok(true)
                    }
                    SavePlan::Rewrite => {
                        let (backup_path, mut backup) = crate::io::create_backup_file(&path)?;
                        let backup_provider = StreamProvider::Path(backup_path.clone());
                        for attachment in &mut container.attachments {
                            if let Some(data) = &mut attachment.data {
                                data.rebind(backup_provider.clone());
                            }
                        }
                        let result = (|| -> Result<()> {
                            let mut output = File::create(&path)?;
                            let patches = container.make_file(
                                &mut backup,
                                &mut output,
                                &config,
                                diag,
                                progress,
                            )?;
                            // the output must be closed before re-opening
                            // for the checksum pass
                            drop(output);
                            if !patches.is_empty() {
                                progress.status("Updating CRC-32 checksums ...");
                                let mut stream = crate::io::open_read_write(&path)?;
                                for patch in patches {
                                    stream.seek(SeekFrom::Start(patch.element_offset + 6))?;
                                    let crc =
                                        crate::io::read_crc32(&mut stream, patch.covered_size)?;
                                    stream.seek(SeekFrom::Start(patch.element_offset + 2))?;
                                    std::io::Write::write_all(&mut stream, &crc.to_le_bytes())?;
                                }
                            }
                            Ok(())
                        })();
                        finish_rewrite(result, &path, &backup_path, diag)?;
                        Ok(true)
                    }
                }
            }
            ContainerImpl::Ogg(container) => {
                let (backup_path, mut backup) = crate::io::create_backup_file(&path)?;
                let result = (|| -> Result<()> {
                    let mut output = File::create(&path)?;
                    let updated = container.make_file(&mut backup, &mut output, diag, progress)?;
                    drop(output);
                    if !updated.is_empty() {
                        progress.status("Updating page checksums ...");
                        let mut stream = crate::io::open_read_write(&path)?;
                        for offset in updated {
                            crate::ogg::page::update_checksum(&mut stream, offset)?;
                        }
                    }
                    Ok(())
                })();
                finish_rewrite(result, &path, &backup_path, diag)?;
                Ok(true)
            }
            ContainerImpl::Mp3(container) => {
                let (backup_path, mut backup) = crate::io::create_backup_file(&path)?;
                let result = (|| -> Result<()> {
                    let mut output = File::create(&path)?;
                    container.make_file(&mut backup, &mut output, diag, progress)?;
                    Ok(())
                })();
                finish_rewrite(result, &path, &backup_path, diag)?;
                Ok(true)
            }
            _ => Err(Error::NotImplemented("saving this format")),
        }
    }
}

fn finish_rewrite(
    result: Result<()>,
    path: &Path,
    backup_path: &Path,
    diag: &mut Diagnostics,
) -> Result<()> {
    match result {
        Ok(()) => {
            std::fs::remove_file(backup_path)?;
            Ok(())
        }
        Err(error) => {
            let restore_context = "restoring backup";
            match crate::io::restore_original_file_from_backup(path, backup_path) {
                Ok(()) => diag.critical(
                    format!("rewriting failed, the original file was restored: {error}"),
                    restore_context,
                ),
                Err(restore_error) => diag.critical(
                    format!(
                        "rewriting failed ({error}) and the backup could not be restored: {restore_error}"
                    ),
                    restore_context,
                ),
            }
            Err(error)
        }
    }
}

fn transfer_removed_values<'a>(
    removed: impl Iterator<Item = &'a dyn Tag>,
    container: &mut Box<Mp3Container>,
    settings: &TagCreationSettings,
) {
    use crate::config::TagCreationFlags;
    if !settings.flags.contains(TagCreationFlags::ID3_TRANSFER_VALUES_ON_REMOVAL) {
        return;
    }
    if let Some(v1) = &mut container.id3v1_tag {
        for tag in removed {
            for &field in crate::tag::KnownField::ALL {
                if v1.value_of(field).is_none() {
                    if let Some(value) = tag.value_of(field) {
                        v1.set_value_of(field, value.clone());
                    }
                }
            }
        }
    }
}

fn read_up_to<R: Read>(io: &mut R, buffer: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buffer.len() {
        match io.read(&mut buffer[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}
