// Container executor: pull, run, wait, collect logs, clean up
//
// Three bind directories under the task workdir are mounted read-write at
// fixed container paths: /mnt/inputs/, /mnt/outputs/ and /mnt/shared/.

use std::path::Path;

use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use uuid::Uuid;

use drover_core::{ContainerSpec, Settings, TaskError};

const MOUNTS: [&str; 3] = ["inputs", "outputs", "shared"];

pub async fn container_execute(
    spec: &ContainerSpec,
    workdir: &Path,
    settings: &Settings,
) -> Result<String, TaskError> {
    let docker = Docker::connect_with_local_defaults()
        .map_err(|e| TaskError::ContainerRuntime(e.to_string()))?;

    let image = spec.image_ref();
    pull_image(&docker, &image, settings).await?;

    for mount in MOUNTS {
        let dir = workdir.join("mnt").join(mount);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| TaskError::io(dir.display().to_string(), e))?;
    }

    let command = spec.command_string();
    let cmd: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    let env: Vec<String> = spec
        .environment
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    let binds: Vec<String> = MOUNTS
        .iter()
        .map(|mount| format!("{}/mnt/{mount}:/mnt/{mount}/:rw", workdir.display()))
        .collect();

    let container_name = format!("drover-{}", Uuid::new_v4().simple());
    let config = Config {
        image: Some(image.clone()),
        cmd: if cmd.is_empty() { None } else { Some(cmd) },
        env: Some(env),
        tty: Some(true),
        host_config: Some(HostConfig {
            binds: Some(binds),
            ..Default::default()
        }),
        ..Default::default()
    };

    docker
        .create_container(
            Some(CreateContainerOptions {
                name: container_name.clone(),
                platform: None,
            }),
            config,
        )
        .await
        .map_err(|e| TaskError::ContainerRuntime(format!("create failed: {e}")))?;

    docker
        .start_container(&container_name, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| TaskError::ContainerRuntime(format!("start failed: {e}")))?;

    let status_code = wait_for_exit(&docker, &container_name).await?;
    let logs = collect_logs(&docker, &container_name).await;

    // Prepend the assembled command so the log is self-describing.
    let logs = format!("{command}\n{logs}");

    if let Err(e) = docker
        .stop_container(&container_name, None::<StopContainerOptions>)
        .await
    {
        tracing::warn!(container = %container_name, error = %e, "Failed to stop container");
    }
    if let Err(e) = docker
        .remove_container(
            &container_name,
            Some(RemoveContainerOptions {
                v: true,
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        tracing::warn!(container = %container_name, error = %e, "Failed to remove container");
    }

    if status_code != 0 {
        return Err(TaskError::ContainerExecution { status_code, logs });
    }
    Ok(logs)
}

/// Pull the image, passing registry credentials when configured.
async fn pull_image(docker: &Docker, image: &str, settings: &Settings) -> Result<(), TaskError> {
    let credentials = settings.docker_registry.as_ref().map(|registry| DockerCredentials {
        username: settings.docker_username.clone(),
        password: settings.docker_password.clone(),
        serveraddress: Some(registry.clone()),
        ..Default::default()
    });

    let mut pull = docker.create_image(
        Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        }),
        None,
        credentials,
    );
    while let Some(progress) = pull.next().await {
        progress.map_err(|e| TaskError::ContainerRuntime(format!("pull of {image} failed: {e}")))?;
    }
    Ok(())
}

async fn wait_for_exit(docker: &Docker, container_name: &str) -> Result<i64, TaskError> {
    let mut wait = docker.wait_container(container_name, None::<WaitContainerOptions<String>>);
    match wait.next().await {
        Some(Ok(response)) => Ok(response.status_code),
        // bollard surfaces a non-zero exit as an error carrying the code
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(e)) => Err(TaskError::ContainerRuntime(format!("wait failed: {e}"))),
        None => Ok(0),
    }
}

/// Capture stdout and stderr into a single string.
async fn collect_logs(docker: &Docker, container_name: &str) -> String {
    let mut logs = String::new();
    let mut stream = docker.logs(
        container_name,
        Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(output) => logs.push_str(&output.to_string()),
            Err(e) => {
                tracing::warn!(container = %container_name, error = %e, "Log read error");
                break;
            }
        }
    }
    logs
}
