use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::SuccessResponse;
use crate::operations::{
    ChangeFileSettings, DeleteFile, File, FileToWrite, FileVisibility, ReadFile, WriteFile,
};
use crate::{CardSession, CardSessionRunnable, Command, Error, Result};

/// Read files from the card
///
/// Without explicit indices every file is read: slots are walked from zero until the card
/// reports `FileNotFound`. Files without data are skipped.
#[derive(Debug, Clone, Default)]
pub struct ReadFilesTask {
    indices: Option<Vec<u8>>,
    read_private: Option<bool>,
    wallet_public_key: Option<Vec<u8>>,
}

impl ReadFilesTask {
    /// Read every file
    pub fn all() -> Self {
        Self::default()
    }

    /// Read the files in the given slots
    pub fn with_indices(indices: Vec<u8>) -> Self {
        Self {
            indices: Some(indices),
            ..Self::default()
        }
    }

    /// Read private files too, overriding [`crate::Config::files_read_private`]
    pub const fn read_private(mut self, read_private: bool) -> Self {
        self.read_private = Some(read_private);
        self
    }

    /// Only read files attached to the wallet with `public_key`
    pub fn with_wallet(mut self, public_key: Vec<u8>) -> Self {
        self.wallet_public_key = Some(public_key);
        self
    }

    fn command(&self, file_index: u8, read_private: bool) -> ReadFile {
        let command = ReadFile::new(file_index).read_private(read_private);
        match &self.wallet_public_key {
            Some(public_key) => command.with_wallet(public_key.clone()),
            None => command,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for ReadFilesTask {
    type Response = Vec<File>;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        let read_private = self
            .read_private
            .unwrap_or(session.environment().config.files_read_private);
        let mut files = Vec::new();

        if let Some(indices) = self.indices.clone() {
            for index in indices {
                let file = self.command(index, read_private).run(session).await?;
                files.push(File::from(file));
            }
            return Ok(files);
        }

        let mut index = 0u8;
        loop {
            let file = match self.command(index, read_private).run(session).await {
                Ok(file) => file,
                Err(error) if error.kind() == &Error::FileNotFound => break,
                Err(error) => return Err(error),
            };
            let next = file.file_index.checked_add(1);
            if !file.file_data.is_empty() {
                files.push(File::from(file));
            }
            match next {
                Some(next) => index = next,
                None => break,
            }
        }
        debug!(count = files.len(), "Read all files");
        Ok(files)
    }
}

/// Slots the written files were stored in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFilesResponse {
    /// Card the files were written to
    pub card_id: String,
    /// One slot per written file, in input order
    pub files_indices: Vec<u8>,
}

/// Write files one after another, optionally deleting every existing file first
#[derive(Debug, Clone)]
pub struct WriteFilesTask {
    files: Vec<FileToWrite>,
    overwrite: bool,
}

impl WriteFilesTask {
    /// Append `files` to the card
    pub const fn new(files: Vec<FileToWrite>) -> Self {
        Self {
            files,
            overwrite: false,
        }
    }

    /// Delete every existing file before writing
    pub const fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[async_trait]
impl CardSessionRunnable for WriteFilesTask {
    type Response = WriteFilesResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        if self.overwrite {
            DeleteFilesTask::all().run(session).await?;
        }

        let mut files_indices = Vec::with_capacity(self.files.len());
        for (position, file) in self.files.iter().enumerate() {
            debug!(position, total = self.files.len(), "Writing file");
            let response = WriteFile::new(file.clone()).run(session).await?;
            files_indices.extend(response.file_index);
        }
        Ok(WriteFilesResponse {
            card_id: SuccessResponse::for_session(session).card_id,
            files_indices,
        })
    }
}

/// Delete files from the card
///
/// Without explicit indices the file in slot zero is deleted until the card reports
/// `FileNotFound`. Explicit slots are deleted highest first so the remaining indices stay valid.
#[derive(Debug, Clone, Default)]
pub struct DeleteFilesTask {
    indices: Option<Vec<u8>>,
}

impl DeleteFilesTask {
    /// Delete every file
    pub const fn all() -> Self {
        Self { indices: None }
    }

    /// Delete the files in the given slots
    pub const fn with_indices(indices: Vec<u8>) -> Self {
        Self {
            indices: Some(indices),
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeleteFilesTask {
    type Response = SuccessResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        match self.indices.clone() {
            Some(mut indices) => {
                indices.sort_unstable();
                indices.dedup();
                for index in indices.into_iter().rev() {
                    DeleteFile::new(index).transceive(session).await?;
                }
            }
            None => loop {
                match DeleteFile::new(0).transceive(session).await {
                    Ok(_) => debug!("Deleted first file"),
                    Err(error) if error.kind() == &Error::FileNotFound => break,
                    Err(error) => return Err(error),
                }
            },
        }
        Ok(SuccessResponse::for_session(session))
    }
}

/// Change the visibility of several files
#[derive(Debug, Clone)]
pub struct ChangeFilesSettingsTask {
    changes: Vec<(u8, FileVisibility)>,
}

impl ChangeFilesSettingsTask {
    /// Apply each `(file index, visibility)` change in order
    pub const fn new(changes: Vec<(u8, FileVisibility)>) -> Self {
        Self { changes }
    }
}

#[async_trait]
impl CardSessionRunnable for ChangeFilesSettingsTask {
    type Response = SuccessResponse;

    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        for (index, visibility) in self.changes.iter().copied() {
            ChangeFileSettings::new(index, visibility)
                .transceive(session)
                .await?;
        }
        Ok(SuccessResponse::for_session(session))
    }
}
